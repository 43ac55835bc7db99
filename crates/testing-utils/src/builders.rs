//! Test data builders

use codebot_core::Task;

/// Builder for creating test Task entities
pub struct TaskBuilder {
    task: Task,
}

impl TaskBuilder {
    pub fn new() -> Self {
        Self {
            task: Task::new("owner/repo", 1)
                .with_branch("codebot/issue-1")
                .with_title("Automated change")
                .with_prompt("please fix the bug")
                .with_requester("octocat"),
        }
    }

    pub fn with_repo(mut self, repo: &str) -> Self {
        self.task.repo = repo.to_string();
        self
    }

    pub fn with_number(mut self, number: u64) -> Self {
        self.task.number = number;
        self
    }

    pub fn with_prompt(mut self, prompt: &str) -> Self {
        self.task.prompt = prompt.to_string();
        self
    }

    pub fn with_requester(mut self, requester: &str) -> Self {
        self.task.requester = requester.to_string();
        self
    }

    pub fn with_branch(mut self, branch: &str) -> Self {
        self.task.branch = branch.to_string();
        self
    }

    pub fn build(self) -> Task {
        self.task
    }
}

impl Default for TaskBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// `count` tasks on the same repo with distinct numbers starting at 1
pub fn distinct_tasks(repo: &str, count: u64) -> Vec<Task> {
    (1..=count)
        .map(|number| TaskBuilder::new().with_repo(repo).with_number(number).build())
        .collect()
}

/// `count` tasks that all share `repo#number`
pub fn same_key_tasks(repo: &str, number: u64, count: usize) -> Vec<Task> {
    (0..count)
        .map(|i| {
            TaskBuilder::new()
                .with_repo(repo)
                .with_number(number)
                .with_prompt(&format!("request {i}"))
                .build()
        })
        .collect()
}
