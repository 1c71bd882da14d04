//! Catalog CLI subcommand: list the standard test cases.

use crate::benchmark::{catalog, TestCase};

use super::truncate;

pub fn run_list(json: bool) -> i32 {
    let cases = catalog::all();
    if json {
        return match serde_json::to_string_pretty(&cases) {
            Ok(text) => {
                println!("{}", text);
                0
            }
            Err(e) => {
                eprintln!("Failed to serialize catalog: {}", e);
                1
            }
        };
    }
    print_cases(&cases);
    0
}

pub fn print_cases(cases: &[TestCase]) {
    println!("{:<24} {:<10} {:<14} {:>8}  {}", "ID", "TASK", "CATEGORY", "EXPECTED", "NAME");
    println!("{}", "-".repeat(80));
    for case in cases {
        let expected = case
            .expected_output_tokens
            .map_or_else(|| "-".to_string(), |t| t.to_string());
        println!(
            "{:<24} {:<10} {:<14} {:>8}  {}",
            case.id,
            case.task.as_str(),
            case.category.display_name(),
            expected,
            truncate(&case.name, 30),
        );
    }
    println!("{} test case(s); `run --quick` uses {}", cases.len(), catalog::quick().len());
}
