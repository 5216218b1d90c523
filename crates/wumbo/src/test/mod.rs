// Test module organization
pub mod test_analyze;
pub mod test_compile;
pub mod test_func_stack;
pub mod test_parser;
