//! Candidate ordering for `fetchTask`, grounded in `Service.cpp::fetchTask`'s
//! sort: effective priority descending, `createdTS` ascending as tie-break.

use batchelor_shared::model::Task;

pub fn sort_candidates(mut candidates: Vec<Task>, now_ts: i64) -> Vec<Task> {
    candidates.sort_by(|a, b| {
        let pa = a.effective_priority(now_ts);
        let pb = b.effective_priority(now_ts);
        pb.cmp(&pa).then_with(|| a.created_ts.cmp(&b.created_ts))
    });
    candidates
}

#[cfg(test)]
mod tests {
    use super::*;
    use batchelor_shared::model::TaskState;
    use std::collections::BTreeMap;

    fn task(id: &str, priority: i64, created_ts: i64) -> Task {
        Task {
            task_id: id.to_string(),
            crc32: 0,
            priority,
            priority_ts: created_ts,
            event_type: "build".to_string(),
            settings: BTreeMap::new(),
            metrics: BTreeMap::new(),
            signals: Vec::new(),
            condition: String::new(),
            created_ts,
            begin_ts: None,
            end_ts: None,
            last_heartbeat_ts: 0,
            state: TaskState::Queued,
            return_code: None,
            message: None,
        }
    }

    #[test]
    fn higher_effective_priority_wins() {
        let candidates = vec![task("low", 1, 0), task("high", 10, 0)];
        let sorted = sort_candidates(candidates, 0);
        assert_eq!(sorted[0].task_id, "high");
    }

    #[test]
    fn ties_break_on_created_ts_ascending() {
        let candidates = vec![task("later", 5, 200), task("earlier", 5, 100)];
        let sorted = sort_candidates(candidates, 0);
        assert_eq!(sorted[0].task_id, "earlier");
    }

    #[test]
    fn aging_can_overtake_a_higher_base_priority() {
        let now = 100 * 60_000;
        // fresh-high was just submitted; aged-low has been waiting 20 minutes.
        let candidates = vec![task("fresh-high", 10, now), task("aged-low", 1, now - 20 * 60_000)];
        let sorted = sort_candidates(candidates, now);
        assert_eq!(sorted[0].task_id, "aged-low");
    }

    #[test]
    fn aging_bonus_is_capped() {
        let now = 700 * 60_000;
        // aged-low has been waiting far longer than the 24-minute aging cap,
        // so fresh-high's base priority still wins.
        let candidates = vec![task("fresh-high", 40, now), task("aged-low", 1, now - 600 * 60_000)];
        let sorted = sort_candidates(candidates, now);
        assert_eq!(sorted[0].task_id, "fresh-high");
    }
}
