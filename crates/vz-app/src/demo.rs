//! Demo mode: a small chart driven through a sequence of data updates
//!
//! chart (plot, inherits the root item)
//! └── series (plot, one node per series)
//!     ├── points (leaf, derived from each series' values)
//!     └── labels (leaf, inherits its series)

use anyhow::{Context, Result};
use serde_json::{json, Value};
use tracing::info;
use vz_core::{DataSource, IdFn, IdSpec, LayerId, Mapping, NodeSet, RenderReport, Scene, StackOrder, Test, VizConfig};
use vz_render::{MemoryCanvas, NativeEvent};
use vz_views::{MarkConfig, MarkRenderer};

/// Totals of one step across all layers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepSummary {
    pub name: &'static str,
    pub added: usize,
    pub changed: usize,
    pub removed: usize,
}

impl StepSummary {
    fn from_report(name: &'static str, report: &RenderReport) -> Self {
        report.iter().fold(
            Self {
                name,
                added: 0,
                changed: 0,
                removed: 0,
            },
            |mut acc, (_, cs)| {
                acc.added += cs.added.len();
                acc.changed += cs.changed.len();
                acc.removed += cs.removed.len();
                acc
            },
        )
    }
}

/// Outcome of a demo run
#[derive(Debug, Clone)]
pub struct DemoRun {
    pub steps: Vec<StepSummary>,
    pub restacked: usize,
    pub click_consumed: bool,
}

fn series(id: &str, values: &[f64]) -> Value {
    json!({"id": id, "name": format!("series {}", id), "values": values})
}

fn points_of(series: &Value) -> Vec<Value> {
    series["values"]
        .as_array()
        .map(|values| {
            values
                .iter()
                .enumerate()
                .map(|(i, v)| json!({"series": series["id"], "i": i, "v": v}))
                .collect()
        })
        .unwrap_or_default()
}

fn point_id() -> IdFn {
    IdFn::func(|p| json!([p["series"], p["i"]]))
}

struct Chart {
    scene: Scene,
    series: LayerId,
    points: LayerId,
}

impl Chart {
    fn build(config: VizConfig) -> Result<Self> {
        let mut scene = Scene::with_config(MemoryCanvas::new(), config);
        scene.set_root_data(json!({"title": "demo"}));

        let chart = scene.add_plot(None, "chart")?;
        let series = scene.add_plot(Some(chart), "series")?;
        scene
            .layer_mut(series)?
            .map_declared("fill", &json!({"field": "id", "lookup": {"a": "tomato", "b": "teal", "c": "gold"}}))?;

        let points = scene.add_leaf(Some(series), "points")?;
        scene
            .layer_mut(points)?
            .map("x", Mapping::field("i"))
            .map("y", Mapping::field("v"))
            .map("fill", Mapping::constant("gray"))
            .map("visible", Mapping::func(|p, _| json!(p["v"].as_f64().is_some_and(|v| v >= 0.0))))
            .set_renderer(MarkRenderer::new(MarkConfig::new("circle", &["x", "y", "fill"])))
            .all(DataSource::derived(points_of), point_id());

        let labels = scene.add_leaf(Some(series), "labels")?;
        scene
            .layer_mut(labels)?
            .map("text", Mapping::field("name"))
            .set_renderer(MarkRenderer::new(MarkConfig::new("text", &["text", "fill"])));

        scene.on(points, "click", |event| {
            info!("Clicked point {} of series {}", event.data["i"], event.data["series"]);
            true
        })?;

        Ok(Self { scene, series, points })
    }

    /// Targets the series layer without selecting any node
    fn quiet(&self) -> NodeSet {
        self.scene.select(self.series).filter(None, None)
    }

    fn step(&mut self, name: &'static str, target: NodeSet) -> StepSummary {
        let report = self.scene.redraw(&target);
        let summary = StepSummary::from_report(name, &report);
        info!("Step '{}' done", name);
        summary
    }

    fn click_first_point(&mut self) -> bool {
        let element = self
            .scene
            .nodes_of(self.points)
            .into_iter()
            .find_map(|id| self.scene.node(id).and_then(MarkRenderer::element_of));
        match element {
            Some(element) => self.scene.dispatch(&mut NativeEvent::new("click", Some(element))),
            None => false,
        }
    }
}

/// Build the demo chart and drive it through its updates
pub fn run(config: VizConfig) -> Result<DemoRun> {
    let mut chart = Chart::build(config).context("Failed to build demo chart")?;
    let mut steps = Vec::new();

    chart
        .scene
        .layer_mut(chart.series)?
        .all(json!([series("a", &[1.0, 2.0, -1.0]), series("b", &[3.0, 4.0])]), IdSpec::Keep);
    let target = chart.scene.select(chart.series);
    steps.push(chart.step("initial", target));

    chart.scene.layer_mut(chart.series)?.add(series("c", &[5.0]))?;
    steps.push(chart.step("append", chart.quiet()));

    chart.scene.layer_mut(chart.series)?.all(
        json!([series("a", &[1.0, 2.5, -1.0]), series("b", &[3.0, 4.0]), series("c", &[5.0])]),
        IdSpec::Keep,
    );
    steps.push(chart.step("update", chart.quiet()));

    let doomed = chart
        .scene
        .select(chart.series)
        .filter(Some(Test::field("id")), Some(vec![json!("b")]));
    doomed.remove(&mut chart.scene)?;
    steps.push(chart.step("remove", chart.quiet()));

    let by_height = StackOrder::compare("y", |a, b| a.as_f64().partial_cmp(&b.as_f64()).unwrap_or(std::cmp::Ordering::Equal));
    let points = chart.scene.select(chart.points);
    let restacked = chart.scene.to_front(&points, &by_height);

    let click_consumed = chart.click_first_point();

    Ok(DemoRun {
        steps,
        restacked,
        click_consumed,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use vz_core::{LogConfig, LogLevel};

    fn quiet_config() -> VizConfig {
        VizConfig {
            log: LogConfig {
                level: LogLevel::Off,
                appenders: Vec::new(),
                with_target: false,
            },
        }
    }

    fn step(name: &'static str, added: usize, changed: usize, removed: usize) -> StepSummary {
        StepSummary {
            name,
            added,
            changed,
            removed,
        }
    }

    #[test]
    fn test_points_of() {
        let items = points_of(&series("a", &[1.0, 2.0]));
        assert_eq!(items.len(), 2);
        assert_eq!(items[1], json!({"series": "a", "i": 1, "v": 2.0}));
        assert!(points_of(&json!({"id": "x"})).is_empty());
    }

    #[test]
    fn test_demo_steps() {
        let run = run(quiet_config()).unwrap();
        assert_eq!(
            run.steps,
            vec![
                // chart 1, series 2, points 5 (one hidden), labels 2
                step("initial", 10, 0, 0),
                step("append", 3, 0, 0),
                // series 3, re-derived visible points 5, labels 3
                step("update", 0, 11, 0),
                // series b with its 2 points and its label
                step("remove", 0, 0, 4),
            ]
        );
        // the hidden point has no graphics to move
        assert_eq!(run.restacked, 3);
        assert!(run.click_consumed);
    }
}
