//! Plain terminal renderer.

use socialstream_core::{ContentView, RenderingMessage};
use socialstream_relay::{Control, PumpReport, Renderer, RoleClass, SessionState, classify_role};

/// Prints new history entries and notices as they arrive.
pub struct TerminalRenderer {
    printed: usize,
    finish_after: Option<usize>,
    finish_sent: bool,
}

impl TerminalRenderer {
    /// `finish_after`: ask the server to finish once this many entries are in
    /// history.
    pub fn new(finish_after: Option<usize>) -> Self {
        Self {
            printed: 0,
            finish_after,
            finish_sent: false,
        }
    }
}

impl Renderer for TerminalRenderer {
    fn render(&mut self, state: &SessionState, report: &PumpReport) -> Control {
        let agent_names = state.agent_names();
        for message in state.history.get(self.printed..).unwrap_or(&[]) {
            if let Some(line) = format_entry(message, agent_names) {
                println!("{line}");
            }
        }
        self.printed = state.history.len();

        for notice in &report.notices {
            println!("! {notice}");
        }

        match self.finish_after {
            Some(limit) if !self.finish_sent && state.history.len() >= limit => {
                self.finish_sent = true;
                println!("-- finishing simulation --");
                Control::Finish
            }
            _ => Control::Continue,
        }
    }
}

/// One display line for a history entry, or `None` if it is not shown.
pub fn format_entry(message: &RenderingMessage, agent_names: [&str; 2]) -> Option<String> {
    let body = describe(&message.content_view());
    let line = match classify_role(&message.role, agent_names) {
        RoleClass::Hidden => return None,
        RoleClass::Info => format!("[info] {body}"),
        RoleClass::Environment => format!("[env] {body}"),
        RoleClass::Observation => format!("[obs] {body}"),
        RoleClass::Evaluation => format!("[eval] {body}"),
        RoleClass::Agent(name) => format!("{name}: {body}"),
    };
    Some(line)
}

fn describe(view: &ContentView<'_>) -> String {
    if let ContentView::Structured(value) = view
        && let Some(action) = value.get("action_type").and_then(|v| v.as_str())
    {
        let argument = value.get("argument").and_then(|v| v.as_str()).unwrap_or("");
        return match action {
            "speak" => format!("\"{argument}\""),
            "none" => "(does nothing)".to_string(),
            "leave" => "(leaves the conversation)".to_string(),
            other => format!("[{other}] {argument}"),
        };
    }
    view.as_text()
}
