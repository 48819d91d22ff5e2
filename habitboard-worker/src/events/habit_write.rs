use anyhow::Context as _;
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::{debug, error, warn};

use habitboard_core::{Data, HabitWriteEvent};
use habitboard_sync::{SyncOutcome, handle_habit_write};
use habitboard_utils::path::DocumentPattern;

/// One line of the inbound event stream.
#[derive(Debug, Deserialize)]
struct WriteEnvelope {
    path: String,
    #[serde(default)]
    before: Option<Map<String, Value>>,
    #[serde(default)]
    after: Option<Map<String, Value>>,
}

/// Decode an event line. `Ok(None)` means the path is outside the trigger
/// binding.
pub fn parse_event_line(
    pattern: &DocumentPattern,
    line: &str,
) -> anyhow::Result<Option<HabitWriteEvent>> {
    let envelope: WriteEnvelope =
        serde_json::from_str(line).context("event line is not a valid write envelope")?;

    let Some(mut params) = pattern.matches(&envelope.path) else {
        debug!(path = %envelope.path, %pattern, "write outside trigger binding");
        return Ok(None);
    };

    let uid = params
        .remove("uid")
        .with_context(|| format!("trigger pattern `{pattern}` does not bind `uid`"))?;
    let habit_id = params.remove("hid").unwrap_or_default();

    Ok(Some(HabitWriteEvent::new(
        uid,
        habit_id,
        envelope.before,
        envelope.after,
    )))
}

/// Decode and handle one event line. Failures are logged, never returned:
/// one bad invocation must not stop the stream.
pub async fn handle_event_line(
    data: &Data,
    pattern: &DocumentPattern,
    line: &str,
) -> Option<SyncOutcome> {
    let event = match parse_event_line(pattern, line) {
        Ok(Some(event)) => event,
        Ok(None) => return None,
        Err(err) => {
            warn!(?err, "skipping malformed event line");
            return None;
        }
    };

    match handle_habit_write(data, &event).await {
        Ok(outcome) => Some(outcome),
        Err(err) => {
            error!(
                ?err,
                uid = event.uid(),
                habit_id = event.habit_id(),
                "habit write invocation failed"
            );
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use habitboard_core::Data;
    use habitboard_database::Database;
    use habitboard_database::impls::leaderboard::get_global_leaderboard;
    use habitboard_sync::SyncOutcome;
    use habitboard_utils::path::DocumentPattern;
    use serde_json::Number;

    use super::{handle_event_line, parse_event_line};

    fn pattern() -> DocumentPattern {
        DocumentPattern::parse("users/{uid}/habits/{hid}").unwrap()
    }

    #[test]
    fn parses_matching_lines() {
        let event = parse_event_line(
            &pattern(),
            r#"{"path":"users/alice/habits/run","before":null,"after":{"done":true}}"#,
        )
        .unwrap()
        .unwrap();

        assert_eq!(event.uid(), "alice");
        assert_eq!(event.habit_id(), "run");
        assert!(!event.is_deletion());
    }

    #[test]
    fn missing_after_is_a_deletion() {
        let event = parse_event_line(&pattern(), r#"{"path":"users/alice/habits/run"}"#)
            .unwrap()
            .unwrap();
        assert!(event.is_deletion());
    }

    #[test]
    fn ignores_paths_outside_binding() {
        let parsed =
            parse_event_line(&pattern(), r#"{"path":"users/alice","after":{}}"#).unwrap();
        assert!(parsed.is_none());
    }

    #[test]
    fn rejects_garbage_and_unbound_uid() {
        assert!(parse_event_line(&pattern(), "not json").is_err());

        let no_uid = DocumentPattern::parse("members/{member}/habits/{hid}").unwrap();
        assert!(
            parse_event_line(&no_uid, r#"{"path":"members/a/habits/b","after":{}}"#).is_err()
        );
    }

    #[tokio::test]
    async fn handles_lines_end_to_end() {
        let data = Data::new(Database::in_memory());

        let outcome = handle_event_line(
            &data,
            &pattern(),
            r#"{"path":"users/alice/habits/run","after":{"done":true}}"#,
        )
        .await;
        assert_eq!(
            outcome,
            Some(SyncOutcome::Synced {
                uid: "alice".to_owned(),
                total_xp: Number::from(0)
            })
        );

        assert_eq!(handle_event_line(&data, &pattern(), "{").await, None);

        let board = get_global_leaderboard(&data.db).await.unwrap();
        assert_eq!(board.total_xp("alice"), Some(&Number::from(0)));
    }
}
