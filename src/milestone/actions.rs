//! Reward action rendering and dispatch.
//!
//! The engine never interprets reward actions itself. It renders the
//! configured template at the correct point in the claim/cross state machine
//! (strictly after a confirmed save) and hands the result to an
//! [`ActionExecutor`] owned by the host. Dispatch is fire-and-forget,
//! at-least-once, and never compensated.

use log::{info, warn};
use tokio::sync::mpsc;

use crate::logutil::escape_log;

/// Values available to a reward action template.
#[derive(Debug, Clone, Copy)]
pub struct ActionContext<'a> {
    pub player: &'a str,
    pub resource: &'a str,
    pub level: u32,
    pub threshold: u64,
    /// Aggregate progress at the moment the action fired.
    pub progress: u64,
}

/// A fully rendered action, ready for the host's command executor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedAction {
    pub player: String,
    pub resource: String,
    pub level: u32,
    pub command: String,
}

/// Substitute the known placeholders into `template`. Unknown placeholders
/// are left verbatim; config loading flags them as issues up front.
pub fn render_template(template: &str, ctx: &ActionContext<'_>) -> RenderedAction {
    let command = template
        .replace("{player}", ctx.player)
        .replace("{resource}", ctx.resource)
        .replace("{level}", &ctx.level.to_string())
        .replace("{threshold}", &ctx.threshold.to_string())
        .replace("{progress}", &ctx.progress.to_string());
    RenderedAction {
        player: ctx.player.to_string(),
        resource: ctx.resource.to_string(),
        level: ctx.level,
        command,
    }
}

/// Outbound seam for reward side effects.
pub trait ActionExecutor: Send + Sync {
    fn dispatch(&self, action: RenderedAction);
}

/// Default executor: logs the rendered command and nothing more. Useful for
/// the operator CLI and for hosts that poll a channel instead.
pub struct LogExecutor;

impl ActionExecutor for LogExecutor {
    fn dispatch(&self, action: RenderedAction) {
        info!(
            "reward action for {} ({} level {}): {}",
            escape_log(&action.player),
            action.resource,
            action.level,
            escape_log(&action.command)
        );
    }
}

/// Executor that forwards rendered actions over an unbounded channel to a
/// consumer task owned by the host server.
pub struct ChannelExecutor {
    tx: mpsc::UnboundedSender<RenderedAction>,
}

impl ChannelExecutor {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<RenderedAction>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl ActionExecutor for ChannelExecutor {
    fn dispatch(&self, action: RenderedAction) {
        if self.tx.send(action).is_err() {
            warn!("reward action receiver dropped; action discarded");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_every_placeholder() {
        let ctx = ActionContext {
            player: "steve",
            resource: "iron_ore",
            level: 2,
            threshold: 500,
            progress: 512,
        };
        let rendered = render_template(
            "give {player} reward_{resource}_{level} # {progress}/{threshold}",
            &ctx,
        );
        assert_eq!(rendered.command, "give steve reward_iron_ore_2 # 512/500");
        assert_eq!(rendered.level, 2);
    }

    #[test]
    fn unknown_placeholders_pass_through() {
        let ctx = ActionContext {
            player: "steve",
            resource: "iron_ore",
            level: 1,
            threshold: 10,
            progress: 10,
        };
        let rendered = render_template("say {palyer}", &ctx);
        assert_eq!(rendered.command, "say {palyer}");
    }

    #[tokio::test]
    async fn channel_executor_delivers_in_order() {
        let (executor, mut rx) = ChannelExecutor::new();
        let ctx = ActionContext {
            player: "steve",
            resource: "iron_ore",
            level: 1,
            threshold: 10,
            progress: 10,
        };
        executor.dispatch(render_template("first {level}", &ctx));
        executor.dispatch(render_template("second {level}", &ctx));
        assert_eq!(rx.recv().await.unwrap().command, "first 1");
        assert_eq!(rx.recv().await.unwrap().command, "second 1");
    }
}
