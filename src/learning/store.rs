//! 跨会话学习存储：把调查洞见追加到 .learnings/*.md
//!
//! - 技术模式（配置/行为/排查路径）→ .learnings/PATTERNS.md
//! - 设备间关系（连接/依赖/协议邻接）→ .learnings/DEVICE_RELATIONSHIPS.md
//! - 每次会话的最终报告 → .learnings/REPORTS.md
//!
//! load_context 读取 PATTERNS 与 DEVICE_RELATIONSHIPS 的最近内容，
//! 注入 planner 与 assessor 的 prompt，让后续会话受益于既有发现。
//! 所有写入都是尽力而为：失败只记日志，绝不影响会话本身。

use std::io::Write;
use std::path::{Path, PathBuf};

/// 学习存储：根目录为 workspace 下的 .learnings
pub struct LearningStore {
    root: PathBuf,
    context_max_chars: usize,
}

/// .learnings 目录：位于 workspace 下
pub fn learnings_root(workspace: &Path) -> PathBuf {
    workspace.join(".learnings")
}

impl LearningStore {
    pub fn new(workspace: &Path, context_max_chars: usize) -> Self {
        Self {
            root: learnings_root(workspace),
            context_max_chars,
        }
    }

    fn patterns_path(&self) -> PathBuf {
        self.root.join("PATTERNS.md")
    }

    fn relationships_path(&self) -> PathBuf {
        self.root.join("DEVICE_RELATIONSHIPS.md")
    }

    fn reports_path(&self) -> PathBuf {
        self.root.join("REPORTS.md")
    }

    /// 技术模式：排查路径、配置/行为规律
    pub fn record_patterns(&self, content: &str) {
        self.append(&self.patterns_path(), "Learned Patterns", content);
    }

    /// 设备间关系：连接、依赖、协议邻接
    pub fn record_relationships(&self, content: &str) {
        self.append(
            &self.relationships_path(),
            "Device Relationships",
            content,
        );
    }

    /// 会话报告存档
    pub fn record_report(&self, user_query: &str, summary: &str) {
        let block = format!("**Request**: {}\n\n{}", user_query.trim(), summary.trim());
        self.append(&self.reports_path(), "Session Reports", &block);
    }

    /// 读取模式与设备关系的最近内容（尾部截断到 context_max_chars）
    pub fn load_context(&self) -> Option<String> {
        let mut combined = String::new();
        for path in [self.patterns_path(), self.relationships_path()] {
            if let Ok(content) = std::fs::read_to_string(&path) {
                combined.push_str(&content);
                combined.push('\n');
            }
        }
        let combined = combined.trim();
        if combined.is_empty() {
            return None;
        }
        if combined.len() <= self.context_max_chars {
            return Some(combined.to_string());
        }
        let cut = combined.len() - self.context_max_chars;
        let boundary = combined
            .char_indices()
            .map(|(i, _)| i)
            .find(|&i| i >= cut)
            .unwrap_or(0);
        Some(format!("...(older entries omitted)\n{}", &combined[boundary..]))
    }

    fn append(&self, path: &Path, title: &str, content: &str) {
        let content = content.trim();
        if content.is_empty() {
            return;
        }
        if let Err(e) = self.ensure_header(path, title) {
            tracing::warn!("Cannot initialize {}: {e}", path.display());
            return;
        }
        let block = format!("\n## {}\n\n{}\n", timestamp(), content);
        let result = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .and_then(|mut f| f.write_all(block.as_bytes()));
        if let Err(e) = result {
            tracing::warn!("Cannot append to {}: {e}", path.display());
        }
    }

    /// 确保文件存在且带标题（首次创建时写入）
    fn ensure_header(&self, path: &Path, title: &str) -> std::io::Result<()> {
        if path.exists() {
            return Ok(());
        }
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let header = format!(
            "# {}\n\n*Cross-session learnings: entries appended below.*\n\n---\n",
            title
        );
        std::fs::write(path, header)
    }
}

fn timestamp() -> String {
    chrono::Local::now().format("%Y-%m-%d %H:%M").to_string()
}
