//! Clustering quality metrics

use ndarray::{Array1, Array2, ArrayView1};
use std::collections::HashMap;

/// Euclidean distance between two points
pub fn euclidean_distance(point1: &ArrayView1<f64>, point2: &ArrayView1<f64>) -> f64 {
    point1
        .iter()
        .zip(point2.iter())
        .map(|(a, b)| (a - b).powi(2))
        .sum::<f64>()
        .sqrt()
}

/// Number of distinct labels
pub fn distinct_labels(labels: &[usize]) -> usize {
    let mut seen: Vec<usize> = labels.to_vec();
    seen.sort_unstable();
    seen.dedup();
    seen.len()
}

/// Within-cluster sum of squared distances to the given centroids
pub fn compute_inertia(features: &Array2<f64>, labels: &[usize], centroids: &Array2<f64>) -> f64 {
    let mut inertia = 0.0;

    for (i, &cluster) in labels.iter().enumerate() {
        if cluster < centroids.nrows() {
            let point = features.row(i);
            let centroid = centroids.row(cluster);
            inertia += point
                .iter()
                .zip(centroid.iter())
                .map(|(a, b)| (a - b).powi(2))
                .sum::<f64>();
        }
    }

    inertia
}

/// Mean silhouette coefficient over all points.
///
/// Points in singleton clusters score 0. Returns `None` unless
/// `2 <= distinct labels <= n - 1`.
pub fn silhouette_score(features: &Array2<f64>, labels: &[usize]) -> Option<f64> {
    let n_samples = features.nrows();
    let n_labels = distinct_labels(labels);
    if n_labels < 2 || n_labels >= n_samples {
        return None;
    }

    let n_clusters = labels.iter().copied().max().map_or(0, |m| m + 1);
    let mut sizes = vec![0usize; n_clusters];
    for &label in labels {
        sizes[label] += 1;
    }

    let mut silhouette_sum = 0.0;
    for i in 0..n_samples {
        let point = features.row(i);
        let cluster_label = labels[i];
        if sizes[cluster_label] <= 1 {
            continue;
        }

        // Sum of distances from point i to every cluster
        let mut distance_sums = vec![0.0; n_clusters];
        for j in 0..n_samples {
            if i == j {
                continue;
            }
            distance_sums[labels[j]] += euclidean_distance(&point, &features.row(j));
        }

        // a(i): mean distance to the rest of its own cluster
        let a_i = distance_sums[cluster_label] / (sizes[cluster_label] - 1) as f64;

        // b(i): smallest mean distance to another cluster
        let b_i = (0..n_clusters)
            .filter(|&c| c != cluster_label && sizes[c] > 0)
            .map(|c| distance_sums[c] / sizes[c] as f64)
            .fold(f64::INFINITY, f64::min);

        let silhouette_i = if b_i.is_infinite() || (a_i == 0.0 && b_i == 0.0) {
            0.0
        } else {
            (b_i - a_i) / a_i.max(b_i)
        };
        silhouette_sum += silhouette_i;
    }

    Some(silhouette_sum / n_samples as f64)
}

/// Per-cluster centroids for an arbitrary labeling, rows indexed by label
pub fn label_centroids(features: &Array2<f64>, labels: &[usize]) -> Array2<f64> {
    let n_clusters = labels.iter().copied().max().map_or(0, |m| m + 1);
    let mut centroids = Array2::zeros((n_clusters, features.ncols()));
    let mut counts = vec![0usize; n_clusters];
    for (row, &label) in features.outer_iter().zip(labels) {
        let mut centroid = centroids.row_mut(label);
        centroid += &row;
        counts[label] += 1;
    }
    for (mut centroid, &count) in centroids.outer_iter_mut().zip(&counts) {
        if count > 0 {
            centroid /= count as f64;
        }
    }
    centroids
}

/// Davies–Bouldin index; lower is better. `None` with fewer than two clusters.
pub fn davies_bouldin_score(features: &Array2<f64>, labels: &[usize]) -> Option<f64> {
    if distinct_labels(labels) < 2 {
        return None;
    }
    let centroids = label_centroids(features, labels);
    let n_clusters = centroids.nrows();

    // Average distance of members to their centroid
    let mut scatter = Array1::<f64>::zeros(n_clusters);
    let mut counts = vec![0usize; n_clusters];
    for (row, &label) in features.outer_iter().zip(labels) {
        scatter[label] += euclidean_distance(&row, &centroids.row(label));
        counts[label] += 1;
    }
    let present: Vec<usize> = (0..n_clusters).filter(|&c| counts[c] > 0).collect();
    for &c in &present {
        scatter[c] /= counts[c] as f64;
    }

    let mut total = 0.0;
    for &i in &present {
        let worst = present
            .iter()
            .filter(|&&j| j != i)
            .map(|&j| {
                let separation = euclidean_distance(&centroids.row(i), &centroids.row(j));
                if separation == 0.0 {
                    0.0
                } else {
                    (scatter[i] + scatter[j]) / separation
                }
            })
            .fold(0.0, f64::max);
        total += worst;
    }
    Some(total / present.len() as f64)
}

/// Adjusted Rand index between two labelings of the same points
pub fn adjusted_rand_index(a: &[usize], b: &[usize]) -> f64 {
    let n = a.len().min(b.len());
    if n < 2 {
        return 1.0;
    }
    let pairs = |count: usize| (count * count.saturating_sub(1)) as f64 / 2.0;

    let mut contingency: HashMap<(usize, usize), usize> = HashMap::new();
    let mut rows: HashMap<usize, usize> = HashMap::new();
    let mut cols: HashMap<usize, usize> = HashMap::new();
    for (&x, &y) in a.iter().zip(b).take(n) {
        *contingency.entry((x, y)).or_default() += 1;
        *rows.entry(x).or_default() += 1;
        *cols.entry(y).or_default() += 1;
    }

    let index: f64 = contingency.values().map(|&c| pairs(c)).sum();
    let sum_rows: f64 = rows.values().map(|&c| pairs(c)).sum();
    let sum_cols: f64 = cols.values().map(|&c| pairs(c)).sum();
    let expected = sum_rows * sum_cols / pairs(n);
    let max_index = (sum_rows + sum_cols) / 2.0;

    if (max_index - expected).abs() < f64::EPSILON {
        1.0
    } else {
        (index - expected) / (max_index - expected)
    }
}
