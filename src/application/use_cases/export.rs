use crate::domain::error::{AppError, Result};
use crate::domain::test_case::TestCaseSet;

const CSV_HEADERS: [&str; 6] = [
    "Test Case ID",
    "Title",
    "Category",
    "Step",
    "Action",
    "Expected Result",
];

/// One row per step, in set order.
pub fn export_test_cases_csv(set: &TestCaseSet) -> Result<String> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer
        .write_record(CSV_HEADERS)
        .map_err(|e| AppError::Internal(format!("Failed to write CSV header: {}", e)))?;

    for case in set.cases() {
        for (index, step) in case.steps.iter().enumerate() {
            let step_number = (index + 1).to_string();
            writer
                .write_record([
                    case.id.as_str(),
                    case.title.as_str(),
                    case.category.as_str(),
                    step_number.as_str(),
                    step.action.as_str(),
                    step.expected_result.as_str(),
                ])
                .map_err(|e| AppError::Internal(format!("Failed to write CSV row: {}", e)))?;
        }
    }

    let bytes = writer
        .into_inner()
        .map_err(|e| AppError::Internal(format!("Failed to flush CSV: {}", e)))?;
    String::from_utf8(bytes).map_err(|e| AppError::Internal(format!("CSV is not UTF-8: {}", e)))
}
