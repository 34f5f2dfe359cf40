use anyhow::{Context, Result};
use data_loader::DataIndex;
use std::path::PathBuf;
use std::time::Instant;

fn main() -> Result<()> {
    let ratings_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("data/ratings.csv"));

    println!("Loading ratings from {:?}...\n", ratings_path);

    let start = Instant::now();
    let index = DataIndex::load_from_files(&ratings_path).context("Failed to load ratings")?;
    let elapsed = start.elapsed();

    let (users, items, ratings) = index.counts();
    let density = ratings as f64 / (users as f64 * items as f64);

    println!("\n=== Load Complete ===");
    println!("Time taken: {:?}", elapsed);
    println!("Users: {}", users);
    println!("Items: {}", items);
    println!("Ratings: {}", ratings);
    println!("Density: {:.4}%", density * 100.0);
    if let Some(scale) = index.rating_scale() {
        println!("Scale: {:?}", scale.levels());
    }
    println!(
        "\nPerformance: {:.0} ratings/second",
        ratings as f64 / elapsed.as_secs_f64()
    );
    Ok(())
}
