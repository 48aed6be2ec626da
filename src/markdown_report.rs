// File: markdown_report.rs
// Description: Markdown报告生成模块，负责生成测试运行的结果总结。

use crate::orchestrator::{RunOutcome, RunState};
use anyhow::{Context, Result};
use log::info;
use std::fs;
use std::path::Path;

/// Renders the run summary as Markdown.
pub fn render_markdown_report(outcome: &RunOutcome) -> String {
    let summary = &outcome.summary;
    let failed = summary.failed();

    let mut markdown = String::new();
    markdown.push_str("# QuickJS 测试结果总结\n\n");
    markdown.push_str(&format!(
        "生成时间: {}\n\n",
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
    ));
    let status = match outcome.state {
        RunState::Done => "完成",
        RunState::Aborted => "中断",
        RunState::Prepare | RunState::Running(_) => "未结束",
    };
    markdown.push_str(&format!("- 状态: {status}\n"));
    markdown.push_str(&format!("- 已执行: {}\n", summary.executed_count()));
    markdown.push_str(&format!("- 通过: {}\n", summary.passed_count()));
    markdown.push_str(&format!("- 失败: {}\n\n", failed.len()));

    if !failed.is_empty() {
        markdown.push_str("| 失败的测试项 |\n|---|\n");
        for name in &failed {
            markdown.push_str(&format!("| `{name}` |\n"));
        }
        markdown.push('\n');
    }
    markdown
}

/// Writes the Markdown summary to `path`, creating parent directories.
pub fn generate_markdown_report(path: &Path, outcome: &RunOutcome) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("无法创建报告目录: {}", parent.display()))?;
    }
    fs::write(path, render_markdown_report(outcome))
        .with_context(|| format!("无法写入总结报告: {}", path.display()))?;
    info!("已生成总结报告: {}", path.display());
    Ok(())
}
