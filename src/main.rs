//! SegmentForge: behavioral segmentation CLI
//!
//! Loads the facility record tables, runs the analysis pipeline and prints
//! the coverage summary, cluster selection, segment hypotheses and context
//! switchers.

use anyhow::{Context, Result};
use clap::Parser;
use segmentforge::logging::init_logging;
use segmentforge::{load_record_store, run_analysis, AnalysisOutcome, Args};
use std::time::Instant;

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(&args.log_config()).context("initializing logging")?;

    if args.verbose {
        println!("SegmentForge - Behavioral Segmentation with JTBD Hypotheses");
        println!("============================================================\n");
    }

    let config = args.analysis_config()?;
    let start_time = Instant::now();

    let store = load_record_store(&args.data_dir)
        .with_context(|| format!("loading records from {}", args.data_dir.display()))?;
    let outcome = run_analysis(&store, &config).context("running segmentation analysis")?;

    print_coverage(&outcome);
    print_selection(&outcome);
    print_segments(&outcome);
    print_switchers(&outcome, args.verbose);

    println!("\n=== Pipeline Complete ===");
    println!("Total processing time: {:.2}s", start_time.elapsed().as_secs_f64());

    Ok(())
}

fn print_coverage(outcome: &AnalysisOutcome) {
    let c = &outcome.coverage;
    println!("=== Data Coverage ===");
    println!("Visits:        {}", c.visits);
    println!("Members:       {}", c.members);
    println!("Transactions:  {}", c.transactions);
    println!("Check-ins:     {}", c.checkins);
    println!("Cancellations: {}", c.cancellations);
    println!("Events:        {}", c.events);
    println!("Customers with features: {}", outcome.features.len());
}

fn print_selection(outcome: &AnalysisOutcome) {
    let seg = &outcome.segmentation;
    println!("\n=== Cluster Selection ===");
    println!("{:>3}  {:>12}  {:>10}", "k", "inertia", "silhouette");
    for score in &seg.k_scores {
        match (&score.skipped, score.inertia, score.silhouette) {
            (None, Some(inertia), Some(silhouette)) => {
                println!("{:>3}  {:>12.2}  {:>10.4}", score.k, inertia, silhouette)
            }
            (reason, _, _) => println!(
                "{:>3}  skipped: {}",
                score.k,
                reason.as_deref().unwrap_or("not scored")
            ),
        }
    }
    println!(
        "✓ Selected k={} (silhouette {:.4}, Davies-Bouldin {:.4})",
        seg.k, seg.silhouette, seg.davies_bouldin
    );
    println!(
        "  Density diagnostic: {} cluster(s), {} noise point(s)",
        seg.density.n_clusters, seg.density.n_noise
    );
    println!(
        "  Hierarchical agreement (ARI): {:.3}",
        seg.hierarchical_agreement
    );
}

fn print_segments(outcome: &AnalysisOutcome) {
    println!("\n=== Segments ===");
    for report in &outcome.segments {
        let profile = &report.profile;
        let hypothesis = &report.hypothesis;
        println!(
            "\nSegment {}: {} ({} customers, {:.1}%, {} confidence)",
            profile.segment_id,
            hypothesis.name,
            profile.size,
            profile.share * 100.0,
            hypothesis.confidence
        );
        println!("  {}", hypothesis.statement());
        for (feature, stats) in &profile.signature.features {
            println!(
                "    {:<26} mean {:>8.3}  median {:>8.3}  std {:>8.3}",
                format!("{feature:?}"),
                stats.mean,
                stats.median,
                stats.std
            );
        }
        println!("  Sample members: {}", profile.member_ids.join(", "));
    }
}

fn print_switchers(outcome: &AnalysisOutcome, verbose: bool) {
    println!("\n=== Context Switchers ===");
    println!("{} customer(s) change behavior with context", outcome.switchers.len());
    if !verbose {
        return;
    }
    for switcher in &outcome.switchers {
        println!("\nCustomer {} ({} visits)", switcher.customer_id, switcher.total_visits);
        for evidence in &switcher.axes {
            println!("  {}:", evidence.axis.name());
            for (label, summary) in [
                (evidence.context_a, &evidence.summary_a),
                (evidence.context_b, &evidence.summary_b),
            ] {
                println!(
                    "    {:<8} visits {:>3}  party {:>4.1}  partners {:>3}  events {:>5.1}%  guests {}",
                    label,
                    summary.visits,
                    summary.avg_party_size,
                    summary.unique_partners,
                    summary.event_rate * 100.0,
                    if summary.has_guests { "yes" } else { "no" }
                );
            }
        }
    }
}
