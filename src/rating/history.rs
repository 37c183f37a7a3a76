use chrono::NaiveDate;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};

use super::{PlayerId, RatingHistoryEvent, RatingId};

/// Rating values of every known player at the end of one day.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimelinePoint {
    pub date: NaiveDate,
    pub values: BTreeMap<PlayerId, i32>,
}

/// Collapses history events into one point per UTC day that has events.
///
/// Each player's value on a day is their last event of that day. Days without
/// an event for a player carry the previous value forward, starting from the
/// player's first event; before that the player is absent. Events whose
/// rating is not in `owners` are dropped.
pub fn build_timeline(
    events: &[RatingHistoryEvent],
    owners: &HashMap<RatingId, PlayerId>,
) -> Vec<TimelinePoint> {
    let mut ordered: Vec<&RatingHistoryEvent> = events.iter().collect();
    ordered.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));

    let mut days: BTreeMap<NaiveDate, BTreeMap<PlayerId, i32>> = BTreeMap::new();
    for event in ordered {
        let Some(&player_id) = owners.get(&event.rating_id) else {
            continue;
        };
        days.entry(event.created_at.date_naive())
            .or_default()
            .insert(player_id, event.value);
    }

    let mut carried: BTreeMap<PlayerId, i32> = BTreeMap::new();
    days.into_iter()
        .map(|(date, changes)| {
            carried.extend(changes);
            TimelinePoint {
                date,
                values: carried.clone(),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rating::test_utils::day;
    use chrono::Duration;

    fn event(
        id: i64,
        rating_id: RatingId,
        value: i32,
        at: chrono::DateTime<chrono::Utc>,
    ) -> RatingHistoryEvent {
        RatingHistoryEvent {
            id,
            rating_id,
            value,
            mean: None,
            deviation: None,
            created_at: at,
        }
    }

    fn owners() -> HashMap<RatingId, PlayerId> {
        HashMap::from([(10, 1), (20, 2)])
    }

    fn date(n: u32) -> NaiveDate {
        day(n).date_naive()
    }

    #[test]
    fn empty_history_gives_empty_timeline() {
        assert!(build_timeline(&[], &owners()).is_empty());
    }

    #[test]
    fn last_event_of_the_day_wins() {
        let events = [
            event(2, 10, 1030, day(1) + Duration::hours(2)),
            event(1, 10, 1016, day(1)),
        ];

        let timeline = build_timeline(&events, &owners());

        assert_eq!(timeline.len(), 1);
        assert_eq!(timeline[0].date, date(1));
        assert_eq!(timeline[0].values[&1], 1030);
    }

    #[test]
    fn carries_values_forward_from_first_appearance() {
        let events = [
            event(1, 10, 1016, day(1)),
            event(2, 20, 984, day(2)),
            event(3, 20, 999, day(4)),
        ];

        let timeline = build_timeline(&events, &owners());

        let dates: Vec<NaiveDate> = timeline.iter().map(|p| p.date).collect();
        assert_eq!(dates, vec![date(1), date(2), date(4)]);
        assert_eq!(timeline[0].values, BTreeMap::from([(1, 1016)]));
        assert_eq!(timeline[1].values, BTreeMap::from([(1, 1016), (2, 984)]));
        assert_eq!(timeline[2].values, BTreeMap::from([(1, 1016), (2, 999)]));
    }

    #[test]
    fn unknown_ratings_are_dropped() {
        let events = [event(1, 99, 1200, day(1)), event(2, 10, 1016, day(2))];

        let timeline = build_timeline(&events, &owners());

        assert_eq!(timeline.len(), 1);
        assert_eq!(timeline[0].date, date(2));
    }
}
