//! `roleplayer chat`: interactive or single-message chat.

use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use roleplayer_agent::RoleplayerAgent;
use roleplayer_config::{AppConfig, PluginName};
use roleplayer_core::{Action, ActionExecutor, AgentReturn, AgentStatus, Message};
use roleplayer_providers::OpenAiCompatProvider;
use roleplayer_tools::{Calculator, CodeInterpreter, Dice, interpreter_executor};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_stream::StreamExt;
use tracing::{debug, warn};

use super::load_config;

pub async fn run(
    config_path: Option<&Path>,
    message: Option<String>,
    stream: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config(config_path).map_err(|e| format!("Failed to load config: {e}"))?;
    if !config.has_api_key() {
        warn!("No API key configured; requests are sent without authorization");
    }

    let agent = build_agent(&config)?;

    if let Some(msg) = message {
        // Single message mode
        let history = vec![Message::user(msg)];
        let ret = reply(&agent, &history, stream).await?;
        if !stream {
            print_reply(&ret);
        }
        return Ok(());
    }

    // Interactive mode
    println!();
    println!("  Roleplayer: interactive mode");
    println!();
    println!("  Provider:     {}", config.provider.name);
    println!("  Model:        {}", config.provider.model);
    println!("  Plugins:      {:?}", config.tools.plugins);
    println!("  Interpreter:  {}", config.tools.interpreter.enabled);
    println!();
    println!("  Type your message and press Enter.");
    println!("  Type 'quit' or Ctrl+C to leave.");
    println!();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut history: Vec<Message> = Vec::new();

    loop {
        print!("  You > ");
        std::io::stdout().flush()?;

        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = tokio::signal::ctrl_c() => None,
        };
        let Some(line) = line else {
            break;
        };

        let input = line.trim();
        if input.is_empty() {
            continue;
        }
        if input == "quit" {
            break;
        }

        history.push(Message::user(input));
        let Some(outcome) =
            interruptible(reply(&agent, &history, stream), tokio::signal::ctrl_c()).await
        else {
            println!();
            println!("  [Interrupted]");
            history.pop();
            continue;
        };
        match outcome {
            Ok(ret) => {
                if !stream {
                    print_reply(&ret);
                }
                history.extend(ret.inner_steps);
            }
            Err(e) => {
                eprintln!("  [Error] {e}");
                history.pop();
            }
        }
        println!();
    }

    println!();
    println!("  Goodbye!");
    Ok(())
}

/// Wire the provider, plugins and interpreter from the config.
pub fn build_agent(config: &AppConfig) -> Result<RoleplayerAgent, Box<dyn std::error::Error>> {
    let provider = OpenAiCompatProvider::from_config(&config.provider)?;
    let mut agent = RoleplayerAgent::from_config(Arc::new(provider), config)?;

    let plugins = config
        .tools
        .plugins
        .iter()
        .fold(ActionExecutor::new(), |executor, name| {
            executor.with_action(plugin(*name))
        });
    if !plugins.is_empty() {
        agent = agent.with_plugins(plugins);
    }

    let interpreter = &config.tools.interpreter;
    if interpreter.enabled {
        agent = agent.with_interpreter(interpreter_executor(CodeInterpreter::new(
            interpreter.program.clone(),
            interpreter.args.clone(),
            Duration::from_secs(interpreter.timeout_secs),
        )));
    }

    debug!(
        plugins = config.tools.plugins.len(),
        interpreter = interpreter.enabled,
        "Agent ready"
    );
    Ok(agent)
}

fn plugin(name: PluginName) -> Box<dyn Action> {
    match name {
        PluginName::Calculator => Box::new(Calculator),
        PluginName::Dice => Box::new(Dice::new()),
    }
}

async fn reply(
    agent: &RoleplayerAgent,
    history: &[Message],
    stream: bool,
) -> Result<AgentReturn, Box<dyn std::error::Error>> {
    if !stream {
        return Ok(agent.chat(history).await?);
    }

    let mut snapshots = agent.stream_chat(history);
    let mut printer = StreamPrinter::default();
    let mut last = None;
    while let Some(snapshot) = snapshots.next().await {
        if snapshot.state.is_error() {
            let reason = snapshot.errmsg.unwrap_or_else(|| "model failure".into());
            return Err(format!("{:?}: {reason}", snapshot.state).into());
        }
        printer.show(&snapshot)?;
        last = Some(snapshot);
    }
    last.ok_or_else(|| "stream ended without a reply".into())
}

/// Run `work` unless `interrupt` resolves first, in which case `work` is
/// dropped and `None` is returned.
async fn interruptible<T, I>(work: impl Future<Output = T>, interrupt: I) -> Option<T>
where
    I: Future,
{
    tokio::select! {
        out = work => Some(out),
        _ = interrupt => None,
    }
}

fn print_reply(ret: &AgentReturn) {
    for action in &ret.actions {
        println!("  [{}] {}", action.action_type, action.payload());
    }
    for line in ret.response.lines() {
        println!("  Assistant > {line}");
    }
    if ret.max_turn_reached {
        println!("  (turn limit reached)");
    }
}

/// Prints streamed text incrementally, one line per tool event.
#[derive(Default)]
struct StreamPrinter {
    shown: String,
}

impl StreamPrinter {
    fn show(&mut self, snapshot: &AgentReturn) -> std::io::Result<()> {
        let mut out = std::io::stdout();
        match snapshot.state {
            AgentStatus::StreamIng => {
                if self.shown.is_empty() && !snapshot.response.is_empty() {
                    write!(out, "  Assistant > ")?;
                }
                match snapshot.response.strip_prefix(self.shown.as_str()) {
                    Some(delta) => write!(out, "{delta}")?,
                    None => write!(out, "\n  Assistant > {}", snapshot.response)?,
                }
                self.shown = snapshot.response.clone();
            }
            AgentStatus::PluginEnd | AgentStatus::CodeEnd => {
                let what = if snapshot.state == AgentStatus::PluginEnd {
                    "calling plugin"
                } else {
                    "running code"
                };
                writeln!(out)?;
                writeln!(out, "  [{what}]")?;
                self.shown.clear();
            }
            AgentStatus::PluginReturn | AgentStatus::CodeReturn => {
                if let Some(action) = snapshot.actions.last() {
                    writeln!(out, "  [{}] {}", action.action_type, action.payload())?;
                }
            }
            AgentStatus::End => {
                if !snapshot.response.is_empty() && snapshot.response != self.shown {
                    write!(out, "\n  Assistant > {}", snapshot.response)?;
                }
                writeln!(out)?;
                if snapshot.max_turn_reached {
                    writeln!(out, "  (turn limit reached)")?;
                }
            }
            _ => {}
        }
        out.flush()
    }
}
