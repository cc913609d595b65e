use crate::geometry::WorldPose;
use crate::pipeline::{RegistrationOutcome, TransformEstimate};

pub fn print_estimate(estimate: &TransformEstimate) {
    println!("=== Registration Estimate ===");
    println!("  Success: {}", estimate.success);
    if let Some(failure) = estimate.failure {
        println!("  Failure: {}", failure);
    }
    println!("  Rotation: {:.3}°", estimate.angle);
    println!("  Scale: {:.4}", estimate.scale);
    println!("  Translation (dy, dx): ({:.2}, {:.2}) px", estimate.translation.0, estimate.translation.1);
    println!("  Peak ratio: {:.2}", estimate.peak_ratio);
    println!("  Iterations: {}", estimate.iterations);
    println!("  Processing Time: {:.2}ms", estimate.processing_time_ms);
    println!();
}

pub fn print_outcome(target_name: &str, before: &WorldPose, outcome: &RegistrationOutcome) {
    print_estimate(&outcome.estimate);
    println!("{}", pose_table(target_name, before, outcome.new_pose.as_ref()));
}

/// Markdown table of the target pose before and after registration.
pub fn pose_table(target_name: &str, before: &WorldPose, after: Option<&WorldPose>) -> String {
    let mut table = String::new();
    table.push_str(&format!("| {} | Position | Rotation (°) | Scale |\n", target_name));
    table.push_str("|---|----------|--------------|-------|\n");
    table.push_str(&pose_row("before", before));
    match after {
        Some(pose) => table.push_str(&pose_row("after", pose)),
        None => table.push_str("| after | unchanged | unchanged | unchanged |\n"),
    }
    table
}

fn pose_row(label: &str, pose: &WorldPose) -> String {
    format!(
        "| {} | ({:.3}, {:.3}) | {:.3} | ({:.4}, {:.4}) |\n",
        label, pose.position.x, pose.position.y, pose.rotation, pose.scale.x, pose.scale.y
    )
}
