//! Clustering Widget

use async_trait::async_trait;
use dataflow_engine::{
    PortDefinition, PortValues, WidgetCategory, WidgetDefinition, WidgetDescriptor, WidgetError,
    WidgetExecutor, WidgetInvocation,
};
use serde_json::{json, Value};

use crate::table::{as_number, column_list, number, Table};

const DEFAULT_CLUSTERS: u64 = 3;
const DEFAULT_MAX_ITERATIONS: u64 = 100;

/// k-means result over standardized features
#[derive(Debug, Clone, PartialEq)]
pub struct KMeans {
    /// Cluster index per input point
    pub labels: Vec<usize>,
    /// Centers in standardized units
    pub centers: Vec<Vec<f64>>,
    /// Sum of squared distances to the assigned center
    pub inertia: f64,
    pub iterations: usize,
}

fn distance_sq(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| (x - y).powi(2)).sum()
}

fn nearest(point: &[f64], centers: &[Vec<f64>]) -> (usize, f64) {
    centers
        .iter()
        .map(|c| distance_sq(point, c))
        .enumerate()
        .min_by(|a, b| a.1.total_cmp(&b.1))
        .unwrap_or((0, 0.0))
}

/// Lloyd's algorithm with farthest-point seeding
///
/// The first point seeds the first center; each further center is the point
/// farthest from the centers chosen so far. Runs are deterministic.
pub fn kmeans(points: &[Vec<f64>], k: usize, max_iterations: usize) -> Result<KMeans, WidgetError> {
    if k == 0 || points.len() < k {
        return Err(WidgetError::failed(format!(
            "Clustering into {} group(s) needs at least {} complete row(s), got {}",
            k,
            k,
            points.len()
        )));
    }

    let mut centers: Vec<Vec<f64>> = vec![points[0].clone()];
    while centers.len() < k {
        let farthest = points
            .iter()
            .max_by(|a, b| nearest(a, &centers).1.total_cmp(&nearest(b, &centers).1))
            .cloned()
            .unwrap_or_default();
        centers.push(farthest);
    }

    let dims = points[0].len();
    let mut labels = vec![usize::MAX; points.len()];
    let mut iterations = 0;
    while iterations < max_iterations {
        iterations += 1;
        let mut changed = false;
        for (label, point) in labels.iter_mut().zip(points) {
            let (best, _) = nearest(point, &centers);
            if *label != best {
                *label = best;
                changed = true;
            }
        }
        if !changed {
            break;
        }

        let mut sums = vec![vec![0.0; dims]; k];
        let mut counts = vec![0usize; k];
        for (label, point) in labels.iter().zip(points) {
            counts[*label] += 1;
            for (s, v) in sums[*label].iter_mut().zip(point) {
                *s += v;
            }
        }
        for ((center, sum), count) in centers.iter_mut().zip(sums).zip(counts) {
            // an emptied cluster keeps its previous center
            if count > 0 {
                *center = sum.into_iter().map(|s| s / count as f64).collect();
            }
        }
    }

    let inertia = labels
        .iter()
        .zip(points)
        .map(|(label, point)| distance_sq(point, &centers[*label]))
        .sum();
    Ok(KMeans {
        labels,
        centers,
        inertia,
        iterations,
    })
}

/// Mean silhouette coefficient; 0 when fewer than two clusters are used
pub fn silhouette(points: &[Vec<f64>], labels: &[usize], k: usize) -> f64 {
    let mut sizes = vec![0usize; k];
    for label in labels {
        sizes[*label] += 1;
    }
    if sizes.iter().filter(|n| **n > 0).count() < 2 {
        return 0.0;
    }

    let mut total = 0.0;
    for (i, point) in points.iter().enumerate() {
        let own = labels[i];
        if sizes[own] <= 1 {
            continue;
        }
        let mut sums = vec![0.0; k];
        for (j, other) in points.iter().enumerate() {
            if i != j {
                sums[labels[j]] += distance_sq(point, other).sqrt();
            }
        }
        let a = sums[own] / (sizes[own] - 1) as f64;
        let b = (0..k)
            .filter(|c| *c != own && sizes[*c] > 0)
            .map(|c| sums[c] / sizes[c] as f64)
            .fold(f64::INFINITY, f64::min);
        let spread = a.max(b);
        if spread > 0.0 {
            total += (b - a) / spread;
        }
    }
    total / points.len() as f64
}

/// Per-column mean and population standard deviation
fn scale_params(points: &[Vec<f64>]) -> Vec<(f64, f64)> {
    let n = points.len() as f64;
    (0..points.first().map_or(0, Vec::len))
        .map(|d| {
            let mean = points.iter().map(|p| p[d]).sum::<f64>() / n;
            let var = points.iter().map(|p| (p[d] - mean).powi(2)).sum::<f64>() / n;
            (mean, var.sqrt())
        })
        .collect()
}

fn positive_int(invocation: &WidgetInvocation, key: &str, default: u64) -> Result<usize, WidgetError> {
    let value = match invocation.param(key) {
        None => default,
        Some(value) => value
            .as_u64()
            .filter(|n| *n > 0)
            .ok_or_else(|| WidgetError::invalid(key, "a positive integer"))?,
    };
    usize::try_from(value).map_err(|_| WidgetError::invalid(key, "a positive integer"))
}

/// Clustering Widget
///
/// k-means over standardized numeric columns. Rows missing any of the
/// columns are not clustered and get a null label.
///
/// # Inputs
/// - `data` (required) - table to cluster
///
/// # Params
/// - `algorithm` - only `kmeans`
/// - `nClusters` - number of clusters (default 3)
/// - `columns` - feature columns (default: every numeric column)
/// - `maxIterations` - iteration cap (default 100)
///
/// # Outputs
/// - `clusters` - `{algorithm, nClusters, columns, labels, centers, inertia,
///   silhouetteScore, iterations}` with centers in the original units
#[derive(Debug, Clone, Copy, Default)]
pub struct ClusteringWidget;

impl ClusteringWidget {
    pub const KIND: &'static str = "clustering";
    /// Port ID for data input
    pub const PORT_DATA: &'static str = "data";
    /// Port ID for clusters output
    pub const PORT_CLUSTERS: &'static str = "clusters";
}

impl WidgetDescriptor for ClusteringWidget {
    fn descriptor() -> WidgetDefinition {
        WidgetDefinition {
            kind: Self::KIND.to_string(),
            label: "Clustering".to_string(),
            description: "Groups rows with k-means clustering".to_string(),
            category: WidgetCategory::Analysis,
            inputs: vec![PortDefinition::required(Self::PORT_DATA, "Data")],
            outputs: vec![PortDefinition::optional(Self::PORT_CLUSTERS, "Clusters")],
        }
    }
}

inventory::submit!(dataflow_engine::DescriptorFn(ClusteringWidget::descriptor));
inventory::submit!(dataflow_engine::ExecutorFn {
    kind: ClusteringWidget::KIND,
    executor: crate::shared::<ClusteringWidget>,
});

#[async_trait]
impl WidgetExecutor for ClusteringWidget {
    async fn execute(&self, invocation: WidgetInvocation) -> Result<PortValues, WidgetError> {
        let table = Table::from_input(&invocation, Self::PORT_DATA)?;
        match invocation.param("algorithm").and_then(Value::as_str) {
            None | Some("kmeans") => {}
            Some(_) => return Err(WidgetError::invalid("algorithm", "kmeans")),
        }
        let k = positive_int(&invocation, "nClusters", DEFAULT_CLUSTERS)?;
        let max_iterations = positive_int(&invocation, "maxIterations", DEFAULT_MAX_ITERATIONS)?;
        let columns = match column_list(&invocation, "columns")? {
            Some(columns) if !columns.is_empty() => {
                table.require_columns(&columns)?;
                columns
            }
            _ => table.numeric_columns(),
        };
        if columns.is_empty() {
            return Err(WidgetError::failed("No numeric columns found"));
        }

        // row index of each complete point
        let mut rows: Vec<usize> = Vec::new();
        let mut points: Vec<Vec<f64>> = Vec::new();
        for (i, row) in table.rows().iter().enumerate() {
            let point: Option<Vec<f64>> = columns
                .iter()
                .map(|c| row.get(c).and_then(as_number))
                .collect();
            if let Some(point) = point {
                rows.push(i);
                points.push(point);
            }
        }

        let scale = scale_params(&points);
        let scaled: Vec<Vec<f64>> = points
            .iter()
            .map(|p| {
                p.iter()
                    .zip(&scale)
                    .map(|(v, (mean, sd))| if *sd > 0.0 { (v - mean) / sd } else { 0.0 })
                    .collect()
            })
            .collect();

        let result = kmeans(&scaled, k, max_iterations)?;
        invocation.check_cancelled()?;
        let score = silhouette(&scaled, &result.labels, k);

        let mut labels = vec![Value::Null; table.row_count()];
        for (row, label) in rows.iter().zip(&result.labels) {
            labels[*row] = json!(label);
        }
        let centers: Vec<Vec<Value>> = result
            .centers
            .iter()
            .map(|center| {
                center
                    .iter()
                    .zip(&scale)
                    .map(|(v, (mean, sd))| number(v * sd + mean))
                    .collect()
            })
            .collect();
        log::debug!(
            "ClusteringWidget {}: {} point(s) in {} cluster(s) after {} iteration(s)",
            invocation.node_id,
            points.len(),
            k,
            result.iterations
        );

        let mut outputs = PortValues::new();
        outputs.insert(
            Self::PORT_CLUSTERS.to_string(),
            json!({
                "algorithm": "kmeans",
                "nClusters": k,
                "columns": columns,
                "labels": labels,
                "centers": centers,
                "inertia": number(result.inertia),
                "silhouetteScore": number(score),
                "iterations": result.iterations,
            }),
        );
        Ok(outputs)
    }
}
