//! Segmentation Engine: standardization, cluster-count search and diagnostics
//!
//! The primary segmentation is K-Means over standardized features, with k
//! chosen by silhouette score. DBSCAN and Ward-linkage agglomerative
//! clusterings are fitted alongside as diagnostics only; they never change
//! the segment labels.

use crate::config::SegmentationConfig;
use crate::error::{stage, PipelineError, PipelineResult};
use crate::features::FeatureTable;
use crate::metrics::{
    adjusted_rand_index, compute_inertia, davies_bouldin_score, distinct_labels,
    silhouette_score,
};
use linfa::prelude::*;
use linfa::traits::Transformer;
use linfa::ParamGuard;
use linfa_clustering::{Dbscan, KMeans};
use linfa_nn::distance::L2Dist;
use ndarray::{Array1, Array2, Axis};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Serialize;
use tracing::{debug, info};

/// Per-feature standardization to zero mean and unit variance.
///
/// Constant features keep a scale of 1 so they map to 0 instead of NaN.
#[derive(Debug, Clone)]
pub struct Standardizer {
    pub mean: Array1<f64>,
    pub scale: Array1<f64>,
}

impl Standardizer {
    pub fn fit(features: &Array2<f64>) -> Self {
        let mean = features
            .mean_axis(Axis(0))
            .unwrap_or_else(|| Array1::zeros(features.ncols()));
        let scale = features
            .std_axis(Axis(0), 0.0)
            .mapv(|s| if s > f64::EPSILON { s } else { 1.0 });
        Self { mean, scale }
    }

    pub fn transform(&self, features: &Array2<f64>) -> Array2<f64> {
        (features - &self.mean) / &self.scale
    }
}

/// K-Means fit for a single k, labels canonicalized to first-appearance order
#[derive(Debug)]
pub struct KMeansModel {
    /// Number of distinct clusters actually produced
    pub n_clusters: usize,
    /// Cluster assignments for the training data, contiguous from 0
    pub labels: Vec<usize>,
    /// Centroids in standardized space, row per canonical label
    pub centroids: Array2<f64>,
    /// Within-cluster sum of squares of the best restart
    pub inertia: f64,
}

impl KMeansModel {
    pub fn cluster_sizes(&self) -> Vec<usize> {
        let mut sizes = vec![0; self.n_clusters];
        for &label in &self.labels {
            if label < self.n_clusters {
                sizes[label] += 1;
            }
        }
        sizes
    }
}

/// Fit K-Means with a fixed seed; linfa keeps the restart with lowest inertia
///
/// # Arguments
/// * `features` - Standardized feature matrix, one row per customer
/// * `n_clusters` - Number of clusters to fit
/// * `config` - Seed, restart count, iteration cap and tolerance
///
/// # Returns
/// * `PipelineResult<KMeansModel>` - Model with labels renumbered by first appearance
pub fn fit_kmeans(
    features: &Array2<f64>,
    n_clusters: usize,
    config: &SegmentationConfig,
) -> PipelineResult<KMeansModel> {
    if features.nrows() < n_clusters {
        return Err(PipelineError::insufficient(
            stage::SEGMENTATION,
            format!(
                "number of customers ({}) must be at least the number of clusters ({})",
                features.nrows(),
                n_clusters
            ),
        ));
    }

    let n_samples = features.nrows();
    let dataset = DatasetBase::new(features.clone(), Array1::from_elem(n_samples, ()));
    let rng = StdRng::seed_from_u64(config.seed);

    let model = KMeans::params_with(n_clusters, rng, L2Dist)
        .n_runs(config.n_restarts)
        .max_n_iterations(config.max_iters)
        .tolerance(config.tolerance)
        .fit(&dataset)
        .map_err(|e| PipelineError::clustering(stage::SEGMENTATION, e))?;

    let raw_labels: Vec<usize> = model.predict(&dataset).to_vec();
    let (labels, order) = canonicalize_labels(&raw_labels);
    let centroids = model.centroids().select(Axis(0), &order);
    let inertia = compute_inertia(features, &labels, &centroids);

    Ok(KMeansModel {
        n_clusters: order.len(),
        labels,
        centroids,
        inertia,
    })
}

/// Renumber labels by order of first appearance.
///
/// Returns the new labels and, for each new label, the original label.
pub fn canonicalize_labels(raw: &[usize]) -> (Vec<usize>, Vec<usize>) {
    let mut order: Vec<usize> = Vec::new();
    let labels = raw
        .iter()
        .map(|&label| match order.iter().position(|&o| o == label) {
            Some(pos) => pos,
            None => {
                order.push(label);
                order.len() - 1
            }
        })
        .collect();
    (labels, order)
}

/// Outcome of scoring one candidate k
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KScore {
    pub k: usize,
    pub inertia: Option<f64>,
    pub silhouette: Option<f64>,
    /// Why the candidate could not be scored
    pub skipped: Option<String>,
}

/// Fit one candidate and score it, or report why it is unscoreable
fn score_candidate(
    features: &Array2<f64>,
    k: usize,
    config: &SegmentationConfig,
) -> PipelineResult<(KMeansModel, f64)> {
    let model = fit_kmeans(features, k, config)?;
    let distinct = distinct_labels(&model.labels);
    match silhouette_score(features, &model.labels) {
        Some(score) => Ok((model, score)),
        None => Err(PipelineError::DegenerateClustering { k, distinct }),
    }
}

/// Try every k in the configured range and keep the best silhouette
///
/// Candidates that cannot be scored are recorded and skipped.
///
/// # Arguments
/// * `features` - Standardized feature matrix
/// * `config` - Candidate range `[k_min, k_max]` and fitting parameters
///
/// # Returns
/// * `PipelineResult<(KMeansModel, f64, Vec<KScore>)>` - Winning model, its
///   silhouette, and one score row per candidate k
pub fn select_cluster_count(
    features: &Array2<f64>,
    config: &SegmentationConfig,
) -> PipelineResult<(KMeansModel, f64, Vec<KScore>)> {
    let n = features.nrows();
    if n < config.k_min {
        return Err(PipelineError::insufficient(
            stage::SEGMENTATION,
            format!("{n} customers is fewer than the minimum cluster count {}", config.k_min),
        ));
    }

    let mut scores = Vec::new();
    let mut best: Option<(KMeansModel, f64)> = None;

    for k in config.k_min..=config.k_max {
        if k > n {
            scores.push(KScore {
                k,
                inertia: None,
                silhouette: None,
                skipped: Some(format!("only {n} customers")),
            });
            continue;
        }

        match score_candidate(features, k, config) {
            Ok((model, score)) => {
                debug!(
                    stage = stage::SEGMENTATION,
                    k,
                    silhouette = score,
                    inertia = model.inertia,
                    "candidate scored"
                );
                scores.push(KScore {
                    k,
                    inertia: Some(model.inertia),
                    silhouette: Some(score),
                    skipped: None,
                });
                if best.as_ref().map_or(true, |(_, best_score)| score > *best_score) {
                    best = Some((model, score));
                }
            }
            Err(err) if err.is_skippable() || matches!(err, PipelineError::Clustering { .. }) => {
                debug!(stage = stage::SEGMENTATION, k, error = %err, "candidate skipped");
                scores.push(KScore {
                    k,
                    inertia: None,
                    silhouette: None,
                    skipped: Some(err.to_string()),
                });
            }
            Err(err) => return Err(err),
        }
    }

    match best {
        Some((model, score)) => Ok((model, score, scores)),
        None => {
            let reasons: Vec<String> = scores
                .iter()
                .map(|s| format!("k={}: {}", s.k, s.skipped.as_deref().unwrap_or("not scored")))
                .collect();
            Err(PipelineError::insufficient(
                stage::SEGMENTATION,
                format!(
                    "no candidate k in [{}, {}] produced a scoreable partition ({})",
                    config.k_min,
                    config.k_max,
                    reasons.join("; ")
                ),
            ))
        }
    }
}

/// DBSCAN memberships; `None` marks a noise point
pub fn fit_density(
    features: &Array2<f64>,
    config: &SegmentationConfig,
) -> PipelineResult<Vec<Option<usize>>> {
    let params = Dbscan::params(config.dbscan_min_points)
        .tolerance(config.dbscan_eps)
        .check()
        .map_err(|e| PipelineError::clustering(stage::DENSITY, e))?;
    Ok(params.transform(features).to_vec())
}

/// Agglomerative clustering with Ward linkage, cut at `n_clusters`.
///
/// Merge costs are maintained with the Lance–Williams update on squared
/// Euclidean distances. Ties merge the lowest index pair first.
pub fn fit_hierarchical(features: &Array2<f64>, n_clusters: usize) -> PipelineResult<Vec<usize>> {
    let n = features.nrows();
    if n_clusters == 0 || n < n_clusters {
        return Err(PipelineError::insufficient(
            stage::HIERARCHICAL,
            format!("cannot cut {n} points into {n_clusters} clusters"),
        ));
    }

    let mut dist = Array2::<f64>::zeros((n, n));
    for i in 0..n {
        for j in (i + 1)..n {
            let d: f64 = features
                .row(i)
                .iter()
                .zip(features.row(j).iter())
                .map(|(a, b)| (a - b).powi(2))
                .sum();
            dist[[i, j]] = d;
            dist[[j, i]] = d;
        }
    }

    let mut size = vec![1usize; n];
    let mut active = vec![true; n];
    // Union-find style parent pointers to the surviving cluster index
    let mut owner: Vec<usize> = (0..n).collect();
    let mut remaining = n;

    while remaining > n_clusters {
        let mut best = (f64::INFINITY, 0, 0);
        for i in (0..n).filter(|&i| active[i]) {
            for j in ((i + 1)..n).filter(|&j| active[j]) {
                if dist[[i, j]] < best.0 {
                    best = (dist[[i, j]], i, j);
                }
            }
        }
        let (d_ij, i, j) = best;

        for m in (0..n).filter(|&m| active[m] && m != i && m != j) {
            let (ni, nj, nm) = (size[i] as f64, size[j] as f64, size[m] as f64);
            let updated =
                ((ni + nm) * dist[[i, m]] + (nj + nm) * dist[[j, m]] - nm * d_ij) / (ni + nj + nm);
            dist[[i, m]] = updated;
            dist[[m, i]] = updated;
        }
        size[i] += size[j];
        active[j] = false;
        for o in owner.iter_mut() {
            if *o == j {
                *o = i;
            }
        }
        remaining -= 1;
    }

    Ok(canonicalize_labels(&owner).0)
}

/// Customer → label mapping produced by one segmentation run
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ClusterAssignment {
    pub customer_ids: Vec<String>,
    /// Primary K-Means segment, contiguous 0..k
    pub segment: Vec<usize>,
    /// DBSCAN diagnostic label; `None` is noise
    pub density: Vec<Option<usize>>,
    /// Ward agglomerative diagnostic label
    pub hierarchical: Vec<usize>,
}

impl ClusterAssignment {
    pub fn segment_of(&self, customer_id: &str) -> Option<usize> {
        self.customer_ids
            .iter()
            .position(|id| id == customer_id)
            .map(|i| self.segment[i])
    }

    /// Row positions belonging to a segment, in discovery order
    pub fn rows_in_segment(&self, segment: usize) -> Vec<usize> {
        self.segment
            .iter()
            .enumerate()
            .filter(|(_, &s)| s == segment)
            .map(|(i, _)| i)
            .collect()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct DensitySummary {
    pub n_clusters: usize,
    pub n_noise: usize,
}

impl DensitySummary {
    pub fn from_memberships(memberships: &[Option<usize>]) -> Self {
        let clustered: Vec<usize> = memberships.iter().flatten().copied().collect();
        Self {
            n_clusters: distinct_labels(&clustered),
            n_noise: memberships.iter().filter(|m| m.is_none()).count(),
        }
    }
}

/// Everything the Segmentation Engine produces for one run
#[derive(Debug, Clone, Serialize)]
pub struct SegmentationResult {
    pub k: usize,
    pub silhouette: f64,
    pub davies_bouldin: f64,
    pub inertia: f64,
    pub k_scores: Vec<KScore>,
    pub assignment: ClusterAssignment,
    pub density: DensitySummary,
    /// Adjusted Rand index between K-Means and agglomerative labels
    pub hierarchical_agreement: f64,
    #[serde(skip)]
    pub centroids: Array2<f64>,
}

/// Standardize, select k, label every customer and run the diagnostics
///
/// # Arguments
/// * `table` - Feature vectors in customer discovery order
/// * `config` - Clustering search and diagnostic parameters
///
/// # Returns
/// * `PipelineResult<SegmentationResult>` - Labels, per-k scores, quality
///   metrics and diagnostic summaries
pub fn segment_customers(
    table: &FeatureTable,
    config: &SegmentationConfig,
) -> PipelineResult<SegmentationResult> {
    let raw = table.to_matrix();
    let features = Standardizer::fit(&raw).transform(&raw);

    let (model, silhouette, k_scores) = select_cluster_count(&features, config)?;
    let k = model.n_clusters;
    info!(
        stage = stage::SEGMENTATION,
        k,
        silhouette,
        inertia = model.inertia,
        sizes = ?model.cluster_sizes(),
        "primary clustering selected"
    );

    let density = fit_density(&features, config)?;
    let density_summary = DensitySummary::from_memberships(&density);
    info!(
        stage = stage::DENSITY,
        clusters = density_summary.n_clusters,
        noise = density_summary.n_noise,
        "density diagnostic complete"
    );

    let hierarchical = fit_hierarchical(&features, k)?;
    let hierarchical_agreement = adjusted_rand_index(&model.labels, &hierarchical);
    info!(
        stage = stage::HIERARCHICAL,
        agreement = hierarchical_agreement,
        "hierarchical diagnostic complete"
    );

    let davies_bouldin = davies_bouldin_score(&features, &model.labels).unwrap_or(f64::NAN);

    Ok(SegmentationResult {
        k,
        silhouette,
        davies_bouldin,
        inertia: model.inertia,
        k_scores,
        assignment: ClusterAssignment {
            customer_ids: table.rows.iter().map(|r| r.customer_id.clone()).collect(),
            segment: model.labels,
            density,
            hierarchical,
        },
        density: density_summary,
        hierarchical_agreement,
        centroids: model.centroids,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn blobs() -> Array2<f64> {
        array![
            [0.0, 0.0],
            [0.1, 0.0],
            [0.0, 0.1],
            [0.1, 0.1],
            [5.0, 5.0],
            [5.1, 5.0],
            [5.0, 5.1],
            [5.1, 5.1],
        ]
    }

    fn config(k_min: usize, k_max: usize) -> SegmentationConfig {
        SegmentationConfig {
            k_min,
            k_max,
            ..SegmentationConfig::default()
        }
    }

    #[test]
    fn test_standardizer_zero_mean_unit_variance() {
        let raw = array![[1.0, 7.0], [3.0, 7.0], [5.0, 7.0]];
        let scaled = Standardizer::fit(&raw).transform(&raw);
        let mean = scaled.mean_axis(Axis(0)).unwrap();
        assert!(mean.iter().all(|m| m.abs() < 1e-12));
        let std = scaled.std_axis(Axis(0), 0.0);
        assert!((std[0] - 1.0).abs() < 1e-12);
        // Constant column maps to zero
        assert!(scaled.column(1).iter().all(|v| *v == 0.0));
    }

    #[test]
    fn test_fit_kmeans_separates_blobs() {
        let model = fit_kmeans(&blobs(), 2, &config(2, 2)).unwrap();
        assert_eq!(model.n_clusters, 2);
        assert_eq!(model.labels, vec![0, 0, 0, 0, 1, 1, 1, 1]);
        assert_eq!(model.cluster_sizes(), vec![4, 4]);
        assert_eq!(model.centroids.shape(), &[2, 2]);
        assert!(model.inertia >= 0.0 && model.inertia.is_finite());
    }

    #[test]
    fn test_fit_kmeans_is_reproducible() {
        let features = blobs();
        let a = fit_kmeans(&features, 3, &config(3, 3)).unwrap();
        let b = fit_kmeans(&features, 3, &config(3, 3)).unwrap();
        assert_eq!(a.labels, b.labels);
    }

    #[test]
    fn test_select_prefers_natural_k() {
        let (model, score, scores) = select_cluster_count(&blobs(), &config(2, 4)).unwrap();
        assert_eq!(model.n_clusters, 2);
        assert!(score > 0.9);
        assert_eq!(scores.len(), 3);
    }

    #[test]
    fn test_too_few_customers() {
        let result = select_cluster_count(&blobs(), &config(9, 10));
        assert!(matches!(result, Err(PipelineError::InsufficientData { .. })));
    }

    #[test]
    fn test_all_candidates_unscoreable() {
        // k equal to n cannot be scored by silhouette
        let features = array![[0.0], [1.0], [2.0]];
        let result = select_cluster_count(&features, &config(3, 3));
        assert!(matches!(result, Err(PipelineError::InsufficientData { .. })));
    }

    #[test]
    fn test_identical_points_degenerate() {
        let features = Array2::<f64>::zeros((6, 2));
        match select_cluster_count(&features, &config(2, 3)) {
            Err(PipelineError::InsufficientData { stage: s, detail }) => {
                assert_eq!(s, stage::SEGMENTATION);
                assert!(detail.contains("k=2: "), "{detail}");
                assert!(detail.contains("k=3: "), "{detail}");
            }
            other => panic!("expected insufficient data, got {other:?}"),
        }
    }

    #[test]
    fn test_unscoreable_candidates_are_skipped() {
        // Eight points: k=8 puts every point alone, k=9 exceeds the customer count
        let (model, score, scores) = select_cluster_count(&blobs(), &config(2, 9)).unwrap();
        assert_eq!(model.n_clusters, 2);
        assert!(score > 0.9);
        assert_eq!(scores.len(), 8);

        let k8 = scores.iter().find(|s| s.k == 8).unwrap();
        assert!(k8.skipped.is_some());
        assert_eq!(k8.silhouette, None);
        let k9 = scores.iter().find(|s| s.k == 9).unwrap();
        assert!(k9.skipped.as_deref().unwrap().contains("only 8 customers"));
        assert!(scores.iter().find(|s| s.k == 2).unwrap().skipped.is_none());
    }

    #[test]
    fn test_canonicalize_labels() {
        let (labels, order) = canonicalize_labels(&[2, 2, 0, 1, 0]);
        assert_eq!(labels, vec![0, 0, 1, 2, 1]);
        assert_eq!(order, vec![2, 0, 1]);
    }

    #[test]
    fn test_hierarchical_matches_blobs() {
        let labels = fit_hierarchical(&blobs(), 2).unwrap();
        assert_eq!(labels, vec![0, 0, 0, 0, 1, 1, 1, 1]);
        assert!(fit_hierarchical(&blobs(), 9).is_err());
    }

    #[test]
    fn test_density_marks_outlier_as_noise() {
        let mut features = Array2::<f64>::zeros((7, 2));
        features[[6, 0]] = 100.0;
        let cfg = SegmentationConfig {
            dbscan_eps: 0.5,
            dbscan_min_points: 3,
            ..SegmentationConfig::default()
        };
        let memberships = fit_density(&features, &cfg).unwrap();
        assert!(memberships[6].is_none());
        assert!(memberships[..6].iter().all(|m| m.is_some()));
        let summary = DensitySummary::from_memberships(&memberships);
        assert_eq!(summary, DensitySummary { n_clusters: 1, n_noise: 1 });
    }
}
