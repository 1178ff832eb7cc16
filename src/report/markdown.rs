//! 确定性 Markdown 报告
//!
//! 不依赖 LLM 的兜底渲染：LLM 报告失败或会话被取消时使用，
//! 保证任何会话都能产出非空 summary。

use crate::core::{InvestigationSession, SessionPhase, StepOutcome};

/// 渲染整个会话为 Markdown 报告
pub fn render(session: &InvestigationSession) -> String {
    let mut out = String::new();

    push_header(&mut out, "Investigation Report");
    push_bold(&mut out, "Request:", &session.user_query);

    if session.phase == SessionPhase::Cancelled {
        push_text(
            &mut out,
            "Note: this session was cancelled before completion. Results below are partial.",
        );
    }

    push_bold(
        &mut out,
        "Retries used:",
        &format!("{} of {}", session.current_retries, session.max_retries),
    );
    if let Some(notes) = &session.assessor_notes {
        push_bold(&mut out, "Assessment:", notes);
    }

    for device in &session.devices {
        push_section(&mut out, &format!("Device: {}", device.device_name));
        if !device.role.is_empty() || !device.profile.is_empty() {
            push_bold(
                &mut out,
                "Profile:",
                &format!("{} {}", device.role, device.profile),
            );
        }
        push_bold(&mut out, "Objective:", &device.objective);
        if let Some(resolution) = &device.resolution {
            push_bold(&mut out, "Resolution:", resolution);
        }

        for outcome in &device.step_outcomes {
            push_step(&mut out, outcome);
        }

        if let Some(limitations) = &device.limitations {
            push_subsection(&mut out, "Limitations");
            for line in limitations.lines() {
                out.push_str(&format!("- {line}\n"));
            }
            out.push('\n');
        }
    }

    out
}

fn push_step(out: &mut String, outcome: &StepOutcome) {
    push_subsection(
        out,
        &format!(
            "Step {} (attempt {}): {}",
            outcome.step_index + 1,
            outcome.attempt + 1,
            outcome.instruction
        ),
    );
    if outcome.invocations.is_empty() {
        push_text(out, "No tool invocation was made for this step.");
        return;
    }
    for inv in &outcome.invocations {
        match (&inv.result, &inv.error) {
            (Some(result), _) => {
                out.push_str(&format!("- `{}` succeeded:\n", inv.function));
                out.push_str("```\n");
                out.push_str(
                    &serde_json::to_string_pretty(result).unwrap_or_else(|_| result.to_string()),
                );
                out.push_str("\n```\n");
            }
            (None, Some(error)) => {
                out.push_str(&format!("- `{}` failed: {error}\n", inv.function));
            }
            (None, None) => {
                out.push_str(&format!("- `{}` was not executed\n", inv.function));
            }
        }
    }
    out.push('\n');
}

fn push_header(out: &mut String, text: &str) {
    out.push_str(&format!("# {text}\n\n"));
}

fn push_section(out: &mut String, text: &str) {
    out.push_str(&format!("## {text}\n\n"));
}

fn push_subsection(out: &mut String, text: &str) {
    out.push_str(&format!("### {text}\n\n"));
}

fn push_text(out: &mut String, text: &str) {
    out.push_str(text);
    out.push_str("\n\n");
}

fn push_bold(out: &mut String, label: &str, value: &str) {
    out.push_str(&format!("**{label}** {value}\n\n"));
}
