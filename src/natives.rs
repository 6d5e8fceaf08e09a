//! Host-supplied functions.
//!
//! A [`NativeTable`] is the only way a script reaches host state. Each entry
//! carries the signature the parser checks calls against, and a callable that
//! receives the evaluated arguments plus a mutable borrow of the host.

use crate::context::{FunctionSignature, IdentifierContext};
use crate::types::Type;
use crate::value::Value;
use std::collections::HashMap;
use std::fmt;

pub type NativeCallable<H> = Box<dyn Fn(&[Value], &mut H) -> Result<Value, String>>;

pub struct NativeFunction<H> {
    pub signature: FunctionSignature,
    pub callable: NativeCallable<H>,
}

impl<H> fmt::Debug for NativeFunction<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeFunction")
            .field("signature", &self.signature)
            .field("callable", &"Function Pointer")
            .finish()
    }
}

/// Hosts that can receive `print` output.
pub trait Console {
    fn write_line(&mut self, line: &str);
}

impl Console for Vec<String> {
    fn write_line(&mut self, line: &str) {
        self.push(line.to_string());
    }
}

pub struct NativeTable<H> {
    functions: HashMap<String, NativeFunction<H>>,
}

impl<H> Default for NativeTable<H> {
    fn default() -> Self {
        Self::new()
    }
}

impl<H> fmt::Debug for NativeTable<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.functions.iter()).finish()
    }
}

impl<H> NativeTable<H> {
    pub fn new() -> Self {
        Self {
            functions: HashMap::new(),
        }
    }

    /// Adds or replaces `name`.
    pub fn register<F>(&mut self, name: &str, return_type: Type, params: Vec<Type>, callable: F) -> &mut Self
    where
        F: Fn(&[Value], &mut H) -> Result<Value, String> + 'static,
    {
        self.insert(name, FunctionSignature::new(return_type, params), Box::new(callable))
    }

    /// Adds a function that takes any number of non-void arguments.
    pub fn register_variadic<F>(&mut self, name: &str, return_type: Type, callable: F) -> &mut Self
    where
        F: Fn(&[Value], &mut H) -> Result<Value, String> + 'static,
    {
        self.insert(name, FunctionSignature::variadic(return_type), Box::new(callable))
    }

    fn insert(&mut self, name: &str, signature: FunctionSignature, callable: NativeCallable<H>) -> &mut Self {
        self.functions
            .insert(name.to_string(), NativeFunction { signature, callable });
        self
    }

    pub fn get(&self, name: &str) -> Option<&NativeFunction<H>> {
        self.functions.get(name)
    }

    /// Seeds a parser context with every native signature.
    pub fn context(&self) -> IdentifierContext {
        IdentifierContext::with_natives(
            self.functions
                .iter()
                .map(|(name, function)| (name.clone(), function.signature.clone())),
        )
    }
}

impl<H: Console> NativeTable<H> {
    /// A table holding `print`, which writes its arguments as one line.
    pub fn standard() -> Self {
        let mut table = Self::new();
        table.register_variadic("print", Type::VOID, |args, host: &mut H| {
            let line: String = args.iter().map(|arg| arg.to_string()).collect();
            host.write_line(&line);
            Ok(Value::Void)
        });
        table
    }
}
