use chrono::Utc;
use models::{ControlPlaneError, ScheduleRecord};
use plotters::prelude::*;
use tokio::sync::Mutex;

/// Append-only log of scheduling decisions, rendered on demand as a PNG
/// with two stacked series: which node each pod landed on, and the reward
/// the scheduler that chose it reported. Both schedulers compute the same
/// reward function, so the series is directly comparable across strategies
/// even though only the DDQN scheduler learns from it.
pub struct Telemetry {
    records: Mutex<Vec<ScheduleRecord>>,
}

impl Telemetry {
    pub fn new() -> Self {
        Self {
            records: Mutex::new(Vec::new()),
        }
    }

    pub async fn record(&self, pod_key: impl Into<String>, node_name: impl Into<String>, reward: f64) {
        self.records.lock().await.push(ScheduleRecord::new(
            Utc::now(),
            pod_key,
            node_name,
            reward,
        ));
    }

    pub async fn records(&self) -> Vec<ScheduleRecord> {
        self.records.lock().await.clone()
    }

    pub async fn render_png(&self, path: &str) -> Result<(), ControlPlaneError> {
        let records = self.records().await;
        render(&records, path)
    }
}

impl Default for Telemetry {
    fn default() -> Self {
        Self::new()
    }
}

fn render(records: &[ScheduleRecord], path: &str) -> Result<(), ControlPlaneError> {
    if let Some(parent) = std::path::Path::new(path).parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .map_err(|e| ControlPlaneError::internal(format!("telemetry render dir: {e}")))?;
        }
    }
    let root = BitMapBackend::new(path, (960, 640)).into_drawing_area();
    root.fill(&WHITE)
        .map_err(|e| ControlPlaneError::internal(format!("telemetry render: {e}")))?;

    let (top, bottom) = root.split_vertically(320);

    let mut node_names: Vec<&str> = records.iter().map(|r| r.node_name.as_str()).collect();
    node_names.sort_unstable();
    node_names.dedup();

    let x_range = 0f64..(records.len().max(1) as f64);

    {
        let mut chart = ChartBuilder::on(&top)
            .caption("node assignment", ("sans-serif", 20))
            .margin(10)
            .x_label_area_size(30)
            .y_label_area_size(120)
            .build_cartesian_2d(x_range.clone(), 0usize..node_names.len().max(1))
            .map_err(|e| ControlPlaneError::internal(format!("telemetry chart: {e}")))?;

        chart
            .configure_mesh()
            .y_labels(node_names.len().max(1))
            .y_label_formatter(&|idx| node_names.get(*idx).unwrap_or(&"").to_string())
            .draw()
            .map_err(|e| ControlPlaneError::internal(format!("telemetry mesh: {e}")))?;

        let points = records.iter().enumerate().map(|(i, r)| {
            let y = node_names.iter().position(|n| *n == r.node_name).unwrap_or(0);
            (i as f64, y)
        });
        chart
            .draw_series(PointSeries::of_element(points, 4, &BLUE, &|c, s, st| {
                EmptyElement::at(c) + Circle::new((0, 0), s, st.filled())
            }))
            .map_err(|e| ControlPlaneError::internal(format!("telemetry series: {e}")))?;
    }

    {
        let max_reward = records.iter().map(|r| r.reward).fold(0.0_f64, f64::max).max(1.0);
        let min_reward = records.iter().map(|r| r.reward).fold(0.0_f64, f64::min).min(0.0);

        let mut chart = ChartBuilder::on(&bottom)
            .caption("reward", ("sans-serif", 20))
            .margin(10)
            .x_label_area_size(30)
            .y_label_area_size(60)
            .build_cartesian_2d(x_range, min_reward..max_reward)
            .map_err(|e| ControlPlaneError::internal(format!("telemetry chart: {e}")))?;

        chart
            .configure_mesh()
            .draw()
            .map_err(|e| ControlPlaneError::internal(format!("telemetry mesh: {e}")))?;

        chart
            .draw_series(LineSeries::new(
                records.iter().enumerate().map(|(i, r)| (i as f64, r.reward)),
                &RED,
            ))
            .map_err(|e| ControlPlaneError::internal(format!("telemetry series: {e}")))?;
    }

    root.present()
        .map_err(|e| ControlPlaneError::internal(format!("telemetry present: {e}")))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn records_accumulate_in_order() {
        let telemetry = Telemetry::new();
        telemetry.record("default/a", "node-a", 0.5).await;
        telemetry.record("default/b", "node-b", 0.7).await;
        let records = telemetry.records().await;
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].pod_key, "default/a");
        assert_eq!(records[1].node_name, "node-b");
    }
}
