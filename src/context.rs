use crate::types::Type;
use std::collections::HashMap;

/// Declared shape of a callable, user-defined or native.
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionSignature {
    pub return_type: Type,
    pub params: Vec<Type>,
    /// Accepts any number of non-void arguments; `params` is ignored.
    pub variadic: bool,
}

impl FunctionSignature {
    pub fn new(return_type: Type, params: Vec<Type>) -> Self {
        Self {
            return_type,
            params,
            variadic: false,
        }
    }

    pub fn variadic(return_type: Type) -> Self {
        Self {
            return_type,
            params: Vec::new(),
            variadic: true,
        }
    }
}

#[derive(Debug, Clone, Default)]
struct StaticScope {
    variables: HashMap<String, Type>,
    functions: HashMap<String, FunctionSignature>,
}

/// Why a declaration was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeclareError {
    /// Already declared in the innermost scope.
    Duplicate,
    /// A function name that belongs to a native.
    Native,
}

/// Compile-time scope chain used by the parser to resolve names and types.
///
/// Natives live in their own table and are consulted before any user scope,
/// matching the runtime lookup order. There is always at least one (global)
/// scope.
#[derive(Debug, Clone)]
pub struct IdentifierContext {
    natives: HashMap<String, FunctionSignature>,
    scopes: Vec<StaticScope>,
}

impl Default for IdentifierContext {
    fn default() -> Self {
        Self::new()
    }
}

impl IdentifierContext {
    pub fn new() -> Self {
        Self {
            natives: HashMap::new(),
            scopes: vec![StaticScope::default()],
        }
    }

    pub fn with_natives<I>(natives: I) -> Self
    where
        I: IntoIterator<Item = (String, FunctionSignature)>,
    {
        Self {
            natives: natives.into_iter().collect(),
            scopes: vec![StaticScope::default()],
        }
    }

    pub fn push_scope(&mut self) {
        self.scopes.push(StaticScope::default());
    }

    pub fn pop_scope(&mut self) {
        if self.scopes.len() > 1 {
            self.scopes.pop();
        }
    }

    pub fn depth(&self) -> usize {
        self.scopes.len()
    }

    /// Drops every scope opened after `depth` was recorded.
    pub fn truncate(&mut self, depth: usize) {
        self.scopes.truncate(depth.max(1));
    }

    pub fn define_variable(&mut self, name: &str, ty: Type) -> Result<(), DeclareError> {
        let scope = self.innermost();
        if scope.variables.contains_key(name) {
            return Err(DeclareError::Duplicate);
        }
        scope.variables.insert(name.to_string(), ty);
        Ok(())
    }

    pub fn define_function(&mut self, name: &str, signature: FunctionSignature) -> Result<(), DeclareError> {
        if self.natives.contains_key(name) {
            return Err(DeclareError::Native);
        }
        let scope = self.innermost();
        if scope.functions.contains_key(name) {
            return Err(DeclareError::Duplicate);
        }
        scope.functions.insert(name.to_string(), signature);
        Ok(())
    }

    pub fn lookup_variable(&self, name: &str) -> Option<Type> {
        self.scopes
            .iter()
            .rev()
            .find_map(|scope| scope.variables.get(name).copied())
    }

    pub fn lookup_function(&self, name: &str) -> Option<&FunctionSignature> {
        if let Some(native) = self.natives.get(name) {
            return Some(native);
        }
        self.scopes.iter().rev().find_map(|scope| scope.functions.get(name))
    }

    fn innermost(&mut self) -> &mut StaticScope {
        if self.scopes.is_empty() {
            self.scopes.push(StaticScope::default());
        }
        let last = self.scopes.len() - 1;
        &mut self.scopes[last]
    }
}
