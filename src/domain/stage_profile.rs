use serde::{Deserialize, Serialize};

/// Fixed persona and contract text for one generation stage.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct StageProfile {
    pub role: String,
    pub goal: String,
    pub backstory: String,
    pub task: String,
    pub expected_output: String,
}

impl StageProfile {
    /// System prompt carrying the role/goal context.
    pub fn system_prompt(&self) -> String {
        format!(
            "You are {}.\nGoal: {}\nBackground: {}\nReturn only JSON. Do not wrap it in prose.",
            self.role.trim(),
            self.goal.trim(),
            self.backstory.trim()
        )
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct StageProfiles {
    pub validator: StageProfile,
    pub test_case_generator: StageProfile,
    pub code_generator: StageProfile,
}
