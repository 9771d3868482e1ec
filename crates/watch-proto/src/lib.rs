pub mod event;

pub use event::{ClassCounts, EventKind, WatchEvent};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_line_shape() {
        let counts = ClassCounts { drowning: 1, swimming: 2, ..Default::default() };
        let ev = WatchEvent::now(EventKind::Alarm, "pool.mp4", 7, counts, "alarm dispatched");
        let line = ev.to_json_line().unwrap();
        assert!(line.ends_with('\n'));
        assert_eq!(line.matches('\n').count(), 1);

        let v: serde_json::Value = serde_json::from_str(line.trim_end()).unwrap();
        assert_eq!(v["kind"], "alarm");
        assert_eq!(v["frame_index"], 7);
        assert_eq!(v["counts"]["swimming"], 2);
        assert!(v["ts_unix_ms"].as_i64().unwrap() > 1_600_000_000_000);
    }

    #[test]
    fn counts_accumulate() {
        let mut total = ClassCounts::default();
        total.add(&ClassCounts { drowning: 1, unknown: 3, ..Default::default() });
        total.add(&ClassCounts { drowning: 2, out_of_water: 1, ..Default::default() });
        assert_eq!(total, ClassCounts { drowning: 3, swimming: 0, out_of_water: 1, unknown: 3 });
    }
}
