// src/macros.rs
//
// Stored command macros and their executor. A macro is a sequence of send
// commands with inter-command delays, repeated `repeat_count` times, with
// `{{name}}` placeholders substituted from caller-supplied values.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use crate::channel::manager::ChannelManager;
use crate::error::MonitorError;
use crate::store::HasId;
use crate::types::{now_ms, SendMode};

/// One send command inside a macro.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MacroCommand {
    pub data: String,
    #[serde(default)]
    pub mode: SendMode,
    #[serde(default)]
    pub delay_ms: u64,
}

/// A named, stored command sequence.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Macro {
    pub id: Uuid,
    pub name: String,
    #[serde(default)]
    pub commands: Vec<MacroCommand>,
    #[serde(default = "default_repeat")]
    pub repeat_count: u32,
    #[serde(default)]
    pub params: Vec<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

fn default_repeat() -> u32 {
    1
}

impl HasId for Macro {
    fn id(&self) -> Uuid {
        self.id
    }
}

/// Wire shape for create/update; id and timestamps are assigned here.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MacroRequest {
    pub name: String,
    pub commands: Vec<MacroCommand>,
    pub repeat_count: Option<u32>,
    pub params: Vec<String>,
}

impl Macro {
    pub fn create(request: MacroRequest) -> Self {
        let now = now_ms();
        Self {
            id: Uuid::new_v4(),
            name: request.name,
            commands: request.commands,
            repeat_count: request.repeat_count.unwrap_or(1).max(1),
            params: request.params,
            created_at: now,
            updated_at: now,
        }
    }

    /// New revision of an existing macro; id and creation time survive.
    pub fn update(&self, request: MacroRequest) -> Self {
        Self {
            id: self.id,
            name: request.name,
            commands: request.commands,
            repeat_count: request.repeat_count.unwrap_or(self.repeat_count).max(1),
            params: request.params,
            created_at: self.created_at,
            updated_at: now_ms(),
        }
    }
}

/// Replace every `{{name}}` placeholder with its value. Placeholders with
/// no supplied value are sent literally.
pub fn substitute(template: &str, values: &HashMap<String, String>) -> String {
    let mut result = template.to_string();
    for (name, value) in values {
        result = result.replace(&format!("{{{{{}}}}}", name), value);
    }
    result
}

// ============================================================================
// Executor
// ============================================================================

pub struct MacroExecutor {
    manager: Arc<ChannelManager>,
}

impl MacroExecutor {
    pub fn new(manager: Arc<ChannelManager>) -> Self {
        Self { manager }
    }

    /// Run a macro on a channel. Commands run in order for `repeat_count`
    /// iterations, sleeping `delay_ms` after each command except the last of
    /// the final iteration. A send failure aborts the run. Dropping the
    /// returned future (scope cancellation) stops at the current delay.
    pub async fn run(
        &self,
        macro_def: &Macro,
        channel_id: &str,
        values: &HashMap<String, String>,
    ) -> Result<(), MonitorError> {
        let repeat = macro_def.repeat_count.max(1);
        info!(
            "[macro] running '{}' on '{}' ({} command(s) x {})",
            macro_def.name,
            channel_id,
            macro_def.commands.len(),
            repeat
        );

        for iteration in 0..repeat {
            for (position, command) in macro_def.commands.iter().enumerate() {
                let data = substitute(&command.data, values);
                self.manager
                    .send(channel_id, &data, command.mode)
                    .map_err(MonitorError::macro_aborted)?;

                let is_last = iteration + 1 == repeat && position + 1 == macro_def.commands.len();
                if !is_last && command.delay_ms > 0 {
                    tokio::time::sleep(Duration::from_millis(command.delay_ms)).await;
                }
            }
            debug!(
                "[macro] '{}' iteration {}/{} done",
                macro_def.name,
                iteration + 1,
                repeat
            );
        }
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================
