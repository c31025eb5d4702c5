use crate::action::ActionEvent;
use crate::types::PhaseArgs;
use async_trait::async_trait;

/// Result of a phase's start callback.
///
/// `Veto` keeps the phase current but skips the listener attachment and
/// the visual-state class.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum StartOutcome {
    #[default]
    Proceed,
    Veto,
}

/// Result of a phase's end callback.
///
/// `Veto` leaves the outgoing phase's listener and class in place.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum EndOutcome {
    #[default]
    Proceed,
    Veto,
}

impl From<bool> for StartOutcome {
    fn from(value: bool) -> Self {
        if value {
            StartOutcome::Proceed
        } else {
            StartOutcome::Veto
        }
    }
}

impl From<bool> for EndOutcome {
    fn from(value: bool) -> Self {
        if value {
            EndOutcome::Proceed
        } else {
            EndOutcome::Veto
        }
    }
}

/// A named, swappable unit of interactive behavior.
#[async_trait]
pub trait Phase: Send + Sync {
    /// Identifier, unique within one game.
    fn id(&self) -> &str;

    /// Class name toggled on the game container while this phase is active.
    fn class_name(&self) -> String {
        class_name(self.id())
    }

    /// CSS `display` value for this phase's elements while it is active.
    fn display_value(&self) -> &str {
        "block"
    }

    async fn on_start(&self, _args: PhaseArgs) -> StartOutcome {
        StartOutcome::Proceed
    }

    async fn on_end(&self) -> EndOutcome {
        EndOutcome::Proceed
    }

    /// Whether this phase wants activation events routed to `on_action`.
    fn handles_actions(&self) -> bool {
        false
    }

    fn on_action(&self, _event: &ActionEvent) {}
}

/// Kebab-case form of a phase identifier: `PlayPhase` becomes `play-phase`.
///
/// Runs of capitals collapse into one segment and a dot right before a
/// capital is dropped, so `Game.Over` becomes `game-over`.
pub fn class_name(id: &str) -> String {
    let mut out = String::with_capacity(id.len() + 4);
    let mut chars = id.chars().peekable();
    let mut in_upper_run = false;

    while let Some(c) = chars.next() {
        if c == '.' && chars.peek().is_some_and(|next| next.is_ascii_uppercase()) {
            continue;
        }

        if c.is_ascii_uppercase() {
            if !in_upper_run {
                out.push('-');
                in_upper_run = true;
            }
            out.push(c.to_ascii_lowercase());
        } else {
            in_upper_run = false;
            out.push(c);
        }
    }

    match out.strip_prefix('-') {
        Some(stripped) => stripped.to_owned(),
        None => out,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_class_name_camel_case() {
        assert_eq!(class_name("PlayPhase"), "play-phase");
        assert_eq!(class_name("Menu"), "menu");
        assert_eq!(class_name("lobby"), "lobby");
    }

    #[test]
    fn test_class_name_groups_capital_runs() {
        assert_eq!(class_name("HTTPServer"), "httpserver");
        assert_eq!(class_name("Game.Over"), "game-over");
    }

    #[test]
    fn test_outcome_from_bool() {
        assert_eq!(StartOutcome::from(false), StartOutcome::Veto);
        assert_eq!(StartOutcome::from(true), StartOutcome::Proceed);
        assert_eq!(EndOutcome::from(false), EndOutcome::Veto);
    }
}
