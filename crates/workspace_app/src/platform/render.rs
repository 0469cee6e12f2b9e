use workspace_core::{AppViewModel, JobPhase, MessageView, Role, StepStatus};

/// Messages shown from the end of the transcript on each render.
const TAIL_MESSAGES: usize = 3;
const TAIL_TIMELINE: usize = 3;

pub fn render(view: &AppViewModel) -> Vec<String> {
    let mut lines = Vec::new();

    let status = if view.processing { "processing" } else { "idle" };
    lines.push(format!(
        "== workspace {} | {} | {} message(s) ==",
        view.workspace_id,
        status,
        view.messages.len()
    ));

    let skip = view.messages.len().saturating_sub(TAIL_MESSAGES);
    for message in view.messages.iter().skip(skip) {
        lines.push(render_message(message));
    }

    for job in &view.jobs {
        let mut line = format!("  job {} [{}] {}", job.job_id, job.kind, phase_label(job.phase));
        if let Some(progress) = job.progress {
            line.push_str(&format!(" {progress}%"));
        }
        if let Some(status) = &job.status {
            line.push_str(&format!(" - {status}"));
        }
        lines.push(line);
    }

    for step in &view.steps {
        lines.push(format!(
            "    {} {} ({})",
            step_marker(step.status),
            step.label,
            step.job_id
        ));
    }

    for activity in &view.activities {
        let progress = activity
            .progress
            .map(|p| format!(" {p}%"))
            .unwrap_or_default();
        lines.push(format!("  @{} {}{}", activity.agent, activity.action, progress));
    }

    let skip = view.timeline.len().saturating_sub(TAIL_TIMELINE);
    for entry in view.timeline.iter().skip(skip) {
        lines.push(format!("  . {}", entry.message));
    }

    if !view.tabs.is_empty() {
        let tabs: Vec<String> = view
            .tabs
            .iter()
            .map(|tab| {
                if tab.is_active {
                    format!("[{}]", tab.id)
                } else {
                    tab.id.clone()
                }
            })
            .collect();
        lines.push(format!("  tabs: {}", tabs.join("  ")));
    }

    lines
}

fn render_message(message: &MessageView) -> String {
    let speaker = match (message.role, &message.agent) {
        (Role::Assistant, Some(agent)) => agent.as_str(),
        (role, _) => role.as_str(),
    };
    let mut line = format!("{} {}: {}", message.id, speaker, message.content);
    if message.is_streaming {
        line.push_str(" ...");
    }
    if message.is_error {
        line.push_str(" (error)");
    }
    if message.variant_count > 1 {
        line.push_str(&format!(
            " [variant {}/{}]",
            message.selected_variant + 1,
            message.variant_count
        ));
    }
    line
}

fn phase_label(phase: JobPhase) -> &'static str {
    match phase {
        JobPhase::Pending => "connecting",
        JobPhase::Streaming => "streaming",
        JobPhase::Finalizing => "finishing",
        JobPhase::Disconnected => "disconnected",
        JobPhase::Closed => "closed",
    }
}

fn step_marker(status: StepStatus) -> &'static str {
    match status {
        StepStatus::Pending => "[ ]",
        StepStatus::Running => "[~]",
        StepStatus::Completed => "[x]",
        StepStatus::Error => "[!]",
    }
}
