//! System prompt assembly.

use swarmline_core::AgentProfile;

const PROTOCOL: &str = r#"Respond with exactly one JSON object and nothing else:

{
  "analysis": "private reasoning, never shown to the user",
  "commentary": "tool requests and technical progress notes",
  "final": "the answer for the user",
  "metadata": {
    "continue": false,
    "reason": "why you are stopping or continuing",
    "progress": {"current_step": 1, "total_steps": 1},
    "tool_calls": [{"tool": "tool_name", "parameters": {}}]
  }
}

Rules:
- Put user-facing text only in "final". Keep it to {lines} lines or fewer unless asked for detail.
- Request tools only through metadata.tool_calls, never by describing them in text.
- Request one tool per response; you will see its result before your next response.
- Set "continue": true only when you need another step to finish the task without user input.
- Omit metadata.tool_calls when you need no tool."#;

/// Build the system prompt for `profile`.
pub fn system_prompt(profile: &AgentProfile, roster: &[AgentProfile], line_budget: usize) -> String {
    let mut prompt = format!("You are {}", profile.name);
    if !profile.role.is_empty() {
        prompt.push_str(&format!(", the {}", profile.role));
    }
    prompt.push_str(".\n");
    if !profile.description.is_empty() {
        prompt.push_str(&profile.description);
        prompt.push('\n');
    }
    if !profile.system_prompt.is_empty() {
        prompt.push('\n');
        prompt.push_str(&profile.system_prompt);
        prompt.push('\n');
    }

    let peers: Vec<&AgentProfile> = roster.iter().filter(|a| a.name != profile.name).collect();
    if !peers.is_empty() {
        prompt.push_str(
            "\nOther agents you can reach with send_mail (mode \"blocking\" waits for their answer):\n",
        );
        for peer in peers {
            if peer.role.is_empty() {
                prompt.push_str(&format!("- {}\n", peer.name));
            } else {
                prompt.push_str(&format!("- {} ({})\n", peer.name, peer.role));
            }
        }
    }

    prompt.push('\n');
    prompt.push_str(&PROTOCOL.replace("{lines}", &line_budget.to_string()));
    prompt
}
