// Compile-time Integration Tests for botlang
//
// Every case here goes through lexing, parsing and type checking only. Each
// suite groups one family of accepted or rejected programs.

use botlang::error::{BotError, ErrorKind};
use botlang::natives::NativeTable;
use botlang::runner::compile;

/// Test result for a single test case
#[derive(Debug)]
pub enum TestResult {
    Pass,
    Fail(String),
    Crash(String),
}

/// Individual test case
#[derive(Debug, Clone)]
pub struct TestCase {
    pub name: String,
    pub input: String,
    pub should_succeed: bool,
    pub expected_error_contains: Option<String>,
    pub expected_kind: Option<ErrorKind>,
}

/// Test suite containing multiple test cases
#[derive(Debug)]
pub struct TestSuite {
    pub name: String,
    pub tests: Vec<TestCase>,
}

impl TestSuite {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            tests: Vec::new(),
        }
    }

    pub fn add_test(&mut self, test: TestCase) {
        self.tests.push(test);
    }

    /// Run all tests in this suite
    pub fn run(&self) -> TestSuiteResults {
        let mut results = TestSuiteResults::new(&self.name);

        println!("Running test suite: {}", self.name);
        println!("{}", "=".repeat(50));

        for test in &self.tests {
            let result = run_single_test(test);
            results.add_result(&test.name, result);
        }

        results.print_summary();
        results
    }
}

/// Results for a test suite run
#[derive(Debug)]
pub struct TestSuiteResults {
    pub suite_name: String,
    pub results: Vec<(String, TestResult)>,
    pub passed: usize,
    pub failed: usize,
    pub crashed: usize,
}

impl TestSuiteResults {
    pub fn new(suite_name: &str) -> Self {
        Self {
            suite_name: suite_name.to_string(),
            results: Vec::new(),
            passed: 0,
            failed: 0,
            crashed: 0,
        }
    }

    pub fn add_result(&mut self, test_name: &str, result: TestResult) {
        match &result {
            TestResult::Pass => {
                self.passed += 1;
                println!("  ✓ {}", test_name);
            }
            TestResult::Fail(msg) => {
                self.failed += 1;
                println!("  ✗ {}: {}", test_name, msg);
            }
            TestResult::Crash(msg) => {
                self.crashed += 1;
                println!("  💥 {}: CRASHED - {}", test_name, msg);
            }
        }
        self.results.push((test_name.to_string(), result));
    }

    pub fn print_summary(&self) {
        println!();
        println!("Test Suite: {} - Summary", self.suite_name);
        println!("{}", "-".repeat(30));
        println!("Passed:  {}", self.passed);
        println!("Failed:  {}", self.failed);
        println!("Crashed: {}", self.crashed);
        println!("Total:   {}", self.results.len());

        if self.crashed > 0 {
            println!("\n⚠️  WARNING: {} tests caused crashes!", self.crashed);
        }

        if self.failed > 0 {
            println!("\n❌ {} tests had unexpected results.", self.failed);
        }

        if self.crashed == 0 && self.failed == 0 {
            println!("\n✅ All tests passed!");
        }
        println!();
    }

    pub fn is_all_passed(&self) -> bool {
        self.crashed == 0 && self.failed == 0
    }
}

/// Run a single test case
fn run_single_test(test: &TestCase) -> TestResult {
    // Catch any panics to detect crashes
    let result = std::panic::catch_unwind(|| compile_input(&test.input));

    match result {
        Ok(compile_result) => match (compile_result, test.should_succeed) {
            (Ok(_), true) => TestResult::Pass,
            (Ok(_), false) => TestResult::Fail("Expected compilation to fail, but it succeeded".to_string()),
            (Err(error), false) => check_error(test, &error),
            (Err(error), true) => TestResult::Fail(format!("Expected compilation to succeed, but got error: {}", error)),
        },
        Err(panic_info) => {
            let panic_msg = if let Some(s) = panic_info.downcast_ref::<String>() {
                s.clone()
            } else if let Some(s) = panic_info.downcast_ref::<&str>() {
                s.to_string()
            } else {
                "Unknown panic".to_string()
            };
            TestResult::Crash(panic_msg)
        }
    }
}

fn check_error(test: &TestCase, error: &BotError) -> TestResult {
    if let Some(expected) = &test.expected_error_contains {
        if !error.message.contains(expected) {
            return TestResult::Fail(format!(
                "Error message '{}' doesn't contain expected text '{}'",
                error.message, expected
            ));
        }
    }
    if let Some(kind) = test.expected_kind {
        if error.kind != kind {
            return TestResult::Fail(format!("Expected a {} but got: {}", kind, error));
        }
    }
    TestResult::Pass
}

/// Compile input against the standard natives
fn compile_input(input: &str) -> Result<botlang::ast::Program, BotError> {
    let natives = NativeTable::<Vec<String>>::standard();
    compile(input, &natives)
}

/// Test case builder for convenience
impl TestCase {
    pub fn should_succeed(name: &str, input: &str) -> Self {
        Self {
            name: name.to_string(),
            input: input.to_string(),
            should_succeed: true,
            expected_error_contains: None,
            expected_kind: None,
        }
    }

    pub fn should_fail(name: &str, input: &str) -> Self {
        Self {
            name: name.to_string(),
            input: input.to_string(),
            should_succeed: false,
            expected_error_contains: None,
            expected_kind: None,
        }
    }

    pub fn should_fail_with_message(name: &str, input: &str, expected_msg: &str) -> Self {
        Self {
            name: name.to_string(),
            input: input.to_string(),
            should_succeed: false,
            expected_error_contains: Some(expected_msg.to_string()),
            expected_kind: None,
        }
    }

    pub fn with_kind(mut self, kind: ErrorKind) -> Self {
        self.expected_kind = Some(kind);
        self
    }
}

// ============================================================================
// Test Suite Creation Functions
// ============================================================================

fn create_malformed_input_tests() -> TestSuite {
    let mut suite = TestSuite::new("Malformed Input");

    // === DELIMITERS ===

    suite.add_test(
        TestCase::should_fail_with_message("unmatched_opening_paren", "(1 + 2", "Expected \")\" after expression")
            .with_kind(ErrorKind::Syntax),
    );
    suite.add_test(TestCase::should_fail_with_message(
        "unmatched_opening_paren_nested",
        "((1 + 2);",
        "Expected \")\" after expression",
    ));
    suite.add_test(TestCase::should_fail_with_message(
        "unmatched_closing_paren",
        "1 + 2);",
        "Expected \";\"",
    ));
    suite.add_test(TestCase::should_fail_with_message(
        "empty_parentheses",
        "();",
        "Expected expression, found \")\"",
    ));
    suite.add_test(TestCase::should_fail_with_message(
        "unmatched_opening_bracket",
        "[1, 2",
        "Expected \"]\" after list elements",
    ));
    suite.add_test(TestCase::should_fail_with_message(
        "unmatched_opening_brace",
        "repeat 2 { int a;",
        "Expected \"}\" after block",
    ));
    suite.add_test(TestCase::should_fail_with_message(
        "stray_closing_brace",
        "}",
        "Expected expression, found \"}\"",
    ));

    // === STATEMENT DELIMITER ===

    suite.add_test(
        TestCase::should_fail_with_message("missing_semicolon", "int x = 1", "Expected \";\"")
            .with_kind(ErrorKind::Syntax),
    );
    suite.add_test(TestCase::should_fail_with_message(
        "missing_semicolon_before_brace",
        "int x; x = 1 }",
        "Expected \";\"",
    ));
    suite.add_test(TestCase::should_fail_with_message(
        "second_point_starts_new_token",
        "1.5.2;",
        "Expected \";\"",
    ));
    suite.add_test(TestCase::should_fail_with_message(
        "digits_end_identifiers",
        "int abc1;",
        "Expected \";\"",
    ));

    // === LEXICAL ===

    suite.add_test(
        TestCase::should_fail_with_message("illegal_character", "int x = 5 @ 3;", "Illegal character \"@\"")
            .with_kind(ErrorKind::Lexical),
    );
    suite.add_test(
        TestCase::should_fail_with_message("unterminated_string", "\"hello", "Unterminated string")
            .with_kind(ErrorKind::Lexical),
    );

    suite
}

fn create_edge_case_tests() -> TestSuite {
    let mut suite = TestSuite::new("Edge Cases");

    suite.add_test(TestCase::should_succeed("empty_input", ""));
    suite.add_test(TestCase::should_succeed("only_whitespace", "   \n\t  "));
    suite.add_test(TestCase::should_succeed("only_comment", "# nothing to see\nhere #"));
    suite.add_test(TestCase::should_fail_with_message(
        "unexpected_eof_after_operator",
        "1 +",
        "Unexpected end of input",
    ));
    suite.add_test(TestCase::should_fail("unexpected_eof_in_expression", "1 + ("));

    let deep_parens = format!("{}1{};", "(".repeat(50), ")".repeat(50));
    suite.add_test(TestCase::should_succeed("deeply_nested_parens", &deep_parens));

    suite.add_test(TestCase::should_succeed("stray_semicolon_after_block", "repeat 1 { };"));
    suite.add_test(TestCase::should_succeed("compound_minus_quirk", "int x; x=-1;"));

    suite
}

fn create_type_tests() -> TestSuite {
    let mut suite = TestSuite::new("Type Checking");

    suite.add_test(TestCase::should_succeed("string_plus_int", "\"a\" + 1;"));
    suite.add_test(TestCase::should_succeed("int_plus_string", "1 + \"a\";"));
    suite.add_test(
        TestCase::should_fail_with_message(
            "bool_plus_int",
            "true + 1;",
            "Operator \"+\" cannot be applied to bool and int",
        )
        .with_kind(ErrorKind::Type),
    );
    suite.add_test(TestCase::should_fail_with_message(
        "compare_strings",
        "\"a\" < \"b\";",
        "cannot be applied to string and string",
    ));
    suite.add_test(TestCase::should_fail("bool_equals_int", "true == 1;"));
    suite.add_test(TestCase::should_succeed("mixed_numeric_compare", "bool b = 1 < 2.5;"));
    suite.add_test(TestCase::should_fail_with_message(
        "not_on_int",
        "not 5;",
        "Operator \"not\" cannot be applied to int",
    ));
    suite.add_test(TestCase::should_fail_with_message(
        "negate_bool",
        "-true;",
        "Operator \"-\" cannot be applied to bool",
    ));

    // === DECLARATIONS AND ASSIGNMENT ===

    suite.add_test(TestCase::should_fail_with_message(
        "narrowing_initializer",
        "int x = 2.5;",
        "Cannot initialize 'x' of type int with double",
    ));
    suite.add_test(TestCase::should_succeed("widening_initializer", "double d = 2;"));
    suite.add_test(TestCase::should_fail_with_message(
        "division_into_int",
        "int x; x = x / 2;",
        "Cannot assign double to 'x' of type int",
    ));
    suite.add_test(TestCase::should_fail_with_message(
        "compound_narrowing",
        "int x; x =+ 1.5;",
        "Operator \"=+\" cannot combine",
    ));
    suite.add_test(TestCase::should_succeed("compound_string_append", "string s; s =+ 5;"));
    suite.add_test(TestCase::should_succeed("assignment_is_a_value", "int x; int y = x = 3;"));
    suite.add_test(TestCase::should_succeed("increment_is_a_value", "double d; double e = d ++;"));
    suite.add_test(
        TestCase::should_fail_with_message(
            "assignment_value_has_target_type",
            "int x; string s = x = 3;",
            "Cannot initialize 's' of type string with int",
        )
        .with_kind(ErrorKind::Type),
    );
    suite.add_test(TestCase::should_fail_with_message(
        "increment_bool",
        "bool b; b ++;",
        "Operator \"++\" needs an int or double",
    ));
    suite.add_test(TestCase::should_fail_with_message(
        "void_variable",
        "void x;",
        "Variables cannot be declared void",
    ));

    // === LISTS ===

    suite.add_test(TestCase::should_succeed("int_list", "int[] xs = [1, 2]; xs[0] + 1;"));
    suite.add_test(TestCase::should_succeed("widened_list", "double[] ds = [1, 2.5];"));
    suite.add_test(TestCase::should_fail_with_message(
        "double_list_into_int_list",
        "int[] xs = [1, 2.5];",
        "Cannot initialize 'xs' of type int[] with double[]",
    ));
    suite.add_test(TestCase::should_fail_with_message(
        "mixed_list",
        "[1, \"a\"];",
        "List elements must share one type",
    ));
    suite.add_test(TestCase::should_fail_with_message(
        "empty_list_literal",
        "[];",
        "List literals need at least one element",
    ));
    suite.add_test(TestCase::should_fail_with_message(
        "string_index",
        "int[] xs = [1]; xs[\"a\"];",
        "List index must be int",
    ));
    suite.add_test(TestCase::should_fail_with_message(
        "index_scalar",
        "int n = 3; n[0];",
        "'n' is a int, not a list",
    ));

    // === CONDITIONS ===

    suite.add_test(TestCase::should_fail_with_message(
        "int_if_condition",
        "if 1 { }",
        "Condition of 'if' must be bool, found int",
    ));
    suite.add_test(TestCase::should_fail_with_message(
        "int_while_condition",
        "while 1 { }",
        "Condition of 'while' must be bool",
    ));
    suite.add_test(TestCase::should_fail_with_message(
        "double_repeat_count",
        "repeat 2.0 { }",
        "Repeat count must be int, found double",
    ));

    suite
}

fn create_identifier_tests() -> TestSuite {
    let mut suite = TestSuite::new("Identifiers and Scopes");

    suite.add_test(
        TestCase::should_fail_with_message("assign_undeclared", "y = 5;", "Variable 'y' does not exist")
            .with_kind(ErrorKind::Identifier),
    );
    suite.add_test(
        TestCase::should_fail_with_message("read_undeclared", "x;", "Variable 'x' does not exist")
            .with_kind(ErrorKind::Identifier),
    );
    suite.add_test(
        TestCase::should_fail_with_message("call_undeclared", "foo();", "Function 'foo' does not exist")
            .with_kind(ErrorKind::Identifier),
    );
    suite.add_test(
        TestCase::should_fail_with_message(
            "speculation_reports_committed_error",
            "int x; print(x + true);",
            "Operator \"+\" cannot be applied to int and bool",
        )
        .with_kind(ErrorKind::Type),
    );
    suite.add_test(TestCase::should_fail_with_message(
        "redeclare_same_scope",
        "int x; double x;",
        "Variable 'x' is already declared in this scope",
    ));
    suite.add_test(TestCase::should_succeed(
        "shadow_in_inner_scope",
        "int x; repeat 1 { string x = \"a\"; }",
    ));
    suite.add_test(TestCase::should_fail_with_message(
        "block_locals_are_dropped",
        "repeat 1 { int t; } t;",
        "Variable 't' does not exist",
    ));
    suite.add_test(TestCase::should_succeed(
        "loop_counter_is_scoped",
        "loop (int i = 0, i < 3, i ++) { } int i;",
    ));

    suite
}

fn create_function_tests() -> TestSuite {
    let mut suite = TestSuite::new("Functions");

    let add = "func int add(int a, int b) { return a + b; } ";

    suite.add_test(TestCase::should_succeed("call_user_function", &format!("{}add(1, 2);", add)));
    suite.add_test(
        TestCase::should_fail_with_message(
            "too_few_arguments",
            &format!("{}add(1);", add),
            "Function 'add' expects 2 argument(s) but got 1",
        )
        .with_kind(ErrorKind::Type),
    );
    suite.add_test(TestCase::should_fail_with_message(
        "argument_type_mismatch",
        &format!("{}add(1, \"2\");", add),
        "Argument 2 of 'add' must be int, found string",
    ));
    suite.add_test(TestCase::should_succeed(
        "int_argument_widens",
        "func double half(double d) { return d / 2; } half(3);",
    ));
    suite.add_test(TestCase::should_succeed(
        "recursion",
        "func int fact(int n) { if n <= 1 { return 1; } return n * fact(n - 1); } fact(5);",
    ));
    suite.add_test(TestCase::should_fail_with_message(
        "wrong_return_type",
        "func int f() { return \"a\"; }",
        "Expected return type int, found string",
    ));
    suite.add_test(TestCase::should_fail_with_message(
        "value_from_void_function",
        "func void f() { return 1; }",
        "Void functions cannot return a value",
    ));
    suite.add_test(TestCase::should_fail_with_message(
        "bare_return_from_int_function",
        "func int f() { return; }",
        "Function must return a int",
    ));
    suite.add_test(TestCase::should_succeed("bare_return_from_void_function", "func void f() { return; }"));
    suite.add_test(TestCase::should_fail_with_message(
        "duplicate_parameter",
        "func int f(int a, int a) { return a; }",
        "Duplicate parameter 'a'",
    ));
    suite.add_test(TestCase::should_fail_with_message(
        "redefine_native",
        "func void print() { }",
        "'print' is a native function and cannot be redefined",
    ));
    suite.add_test(TestCase::should_fail_with_message(
        "redefine_function",
        "func void f() { } func void f() { }",
        "Function 'f' is already declared in this scope",
    ));
    suite.add_test(TestCase::should_succeed("variadic_print", "print(\"a\", 1, 2.5, true);"));
    suite.add_test(TestCase::should_fail_with_message(
        "void_argument_to_print",
        "func void g() { } print(g());",
        "Argument to 'print' has no value",
    ));
    suite.add_test(TestCase::should_succeed("top_level_return_compiles", "return 5;"));

    suite
}

fn create_control_flow_tests() -> TestSuite {
    let mut suite = TestSuite::new("Control Flow");

    suite.add_test(TestCase::should_succeed("repeat", "int x; repeat 3 { x ++; }"));
    suite.add_test(TestCase::should_succeed("loop", "loop (int i = 0, i < 3, i ++) { print(i); }"));
    suite.add_test(TestCase::should_succeed("loop_expression_initializer", "loop (0, true, 1) { break; }"));
    suite.add_test(TestCase::should_fail_with_message(
        "loop_int_condition",
        "loop (int i = 0, i, i ++) { }",
        "Condition of 'loop' must be bool",
    ));
    suite.add_test(TestCase::should_succeed("if_chain", "if true { } elif false { } else { }"));
    suite.add_test(TestCase::should_succeed("try_chain", "try { } eltry { } else { }"));
    suite.add_test(TestCase::should_succeed(
        "parenthesized_condition",
        "if (1 == 2) { int a; } else { int b; }",
    ));
    suite.add_test(
        TestCase::should_fail_with_message("break_outside_loop", "break;", "'break' outside of a loop")
            .with_kind(ErrorKind::Syntax),
    );
    suite.add_test(TestCase::should_fail_with_message(
        "continue_in_function_inside_loop",
        "while true { func void f() { continue; } }",
        "'continue' outside of a loop",
    ));

    // === CONDITIONAL EXPRESSIONS ===

    suite.add_test(TestCase::should_succeed("if_expression", "int v = if 1 == 2 3 else 4;"));
    suite.add_test(TestCase::should_succeed("if_expression_statement", "if true 1 else 2;"));
    suite.add_test(TestCase::should_succeed("nested_in_arithmetic", "int v = 1 + if true 1 else 2;"));
    suite.add_test(TestCase::should_succeed("try_expression", "double v = try 10 / 0 else 0.0;"));
    suite.add_test(TestCase::should_succeed(
        "mixed_if_and_try_branches",
        "int v = if false 1 eltry 2 else 3;",
    ));
    suite.add_test(
        TestCase::should_fail_with_message(
            "if_expression_without_else",
            "int v = if (1 == 2) 1;",
            "must have a catching else",
        )
        .with_kind(ErrorKind::Syntax),
    );
    suite.add_test(TestCase::should_fail_with_message(
        "branch_types_differ",
        "int v = if true 1 else \"a\";",
        "must share one type",
    ));
    suite.add_test(TestCase::should_fail_with_message(
        "branch_types_are_not_widened",
        "double v = if true 1 else 2.5;",
        "must share one type",
    ));

    suite
}

// ============================================================================
// Main Test Function
// ============================================================================

#[test]
fn comprehensive_compile_tests() {
    println!("🧪 botlang Compile-time Test Suite");
    println!("==================================\n");

    let mut all_passed = true;

    let suites = vec![
        create_malformed_input_tests(),
        create_edge_case_tests(),
        create_type_tests(),
        create_identifier_tests(),
        create_function_tests(),
        create_control_flow_tests(),
    ];

    for suite in suites {
        let results = suite.run();
        if !results.is_all_passed() {
            all_passed = false;
        }
    }

    assert!(all_passed, "Some compile tests failed. See output above for details.");
}

#[test]
fn compiled_root_is_a_void_block() {
    let natives = NativeTable::<Vec<String>>::standard();
    let program = compile("int x = 1; x + 2;", &natives).expect("program should compile");
    assert!(program.root.ty.is_void());
    assert_eq!(program.statements().len(), 2);
}

#[test]
fn error_display_names_kind_and_range() {
    let natives = NativeTable::<Vec<String>>::standard();
    let error = compile("int x;\nx = 1\nint y;", &natives).unwrap_err();
    assert_eq!(
        error.to_string(),
        "Syntax Error: Expected \";\" ([line: 3, Column: 1] to [line: 3, Column: 4])."
    );
}
