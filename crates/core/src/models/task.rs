use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// 任务定义
///
/// 由评论触发事件生成的一次代码生成请求。分发器只关心 `repo` 和 `number`
/// （组成串行化键）以及 `attempt`，其余字段原样透传给执行器。
///
/// # 字段说明
///
/// - `id`: 日志关联用的唯一标识，不参与串行化
/// - `repo`: 仓库全名，如 `owner/repo`
/// - `number`: Issue 或 PR 编号
/// - `branch`: 生成结果推送的目标分支
/// - `title`: 生成的 PR 标题
/// - `prompt`: 触发评论中的提示文本
/// - `requester`: 触发者账号
/// - `requested_at`: 触发时间
/// - `attempt`: 从 1 开始的执行次数
///
/// # 使用示例
///
/// ```rust
/// use codebot_core::models::Task;
///
/// let task = Task::new("owner/repo", 42).with_prompt("修复登录页面的拼写错误");
/// assert_eq!(task.key(), "owner/repo#42");
/// assert_eq!(task.attempt, 1);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    #[serde(default = "Uuid::new_v4")]
    pub id: Uuid,
    pub repo: String,
    pub number: u64,
    #[serde(default)]
    pub branch: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub prompt: String,
    #[serde(default)]
    pub requester: String,
    #[serde(default = "Utc::now")]
    pub requested_at: DateTime<Utc>,
    #[serde(default = "first_attempt")]
    pub attempt: u32,
}

fn first_attempt() -> u32 {
    1
}

impl Task {
    pub fn new(repo: impl Into<String>, number: u64) -> Self {
        Self {
            id: Uuid::new_v4(),
            repo: repo.into(),
            number,
            branch: String::new(),
            title: String::new(),
            prompt: String::new(),
            requester: String::new(),
            requested_at: Utc::now(),
            attempt: first_attempt(),
        }
    }

    pub fn with_branch(mut self, branch: impl Into<String>) -> Self {
        self.branch = branch.into();
        self
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    pub fn with_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.prompt = prompt.into();
        self
    }

    pub fn with_requester(mut self, requester: impl Into<String>) -> Self {
        self.requester = requester.into();
        self
    }

    /// 串行化键：`repo#number`
    ///
    /// 同一个键的任务在整个分发器范围内同一时刻最多执行一个。
    pub fn key(&self) -> String {
        format!("{}#{}", self.repo, self.number)
    }
}

/// 队列元素
///
/// 实际放入有界队列的单元。尝试次数随元素一起传递，而不是从任务上推断。
#[derive(Debug, Clone)]
pub struct QueueItem {
    pub task: Task,
    pub attempt: u32,
}

impl QueueItem {
    /// 首次入队的元素
    pub fn first(task: Task) -> Self {
        Self { task, attempt: 1 }
    }

    /// 交给执行器前，把当前尝试次数写回任务
    pub fn stamp_attempt(&mut self) -> &Task {
        self.task.attempt = self.attempt;
        &self.task
    }

    pub fn key(&self) -> String {
        self.task.key()
    }
}
