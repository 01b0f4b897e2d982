use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One scheduling decision, appended to the telemetry log. `reward` is the
/// same reward function for both strategies, so it's a comparable signal
/// across a balanced decision and a DDQN decision even though only the DDQN
/// scheduler uses it to learn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleRecord {
    pub timestamp: DateTime<Utc>,
    pub pod_key: String,
    pub node_name: String,
    pub reward: f64,
}

impl ScheduleRecord {
    pub fn new(timestamp: DateTime<Utc>, pod_key: impl Into<String>, node_name: impl Into<String>, reward: f64) -> Self {
        Self {
            timestamp,
            pod_key: pod_key.into(),
            node_name: node_name.into(),
            reward,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn construction_preserves_fields() {
        let now = Utc::now();
        let record = ScheduleRecord::new(now, "default/web", "node-a", 0.73);
        assert_eq!(record.pod_key, "default/web");
        assert_eq!(record.node_name, "node-a");
        assert_eq!(record.reward, 0.73);
        assert_eq!(record.timestamp, now);
    }
}
