//! Run this example with the following command in a terminal:
//!
//! ```console
//! $ RUST_LOG=debug cargo run --example create_bag -- ./src /tmp/my-bag.tar
//! ```
//!
//! The bag follows the profile in `tests/fixtures/profile.json`.

use async_bagit::{BagItProfile, Bagger};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args: Vec<String> = std::env::args().collect();
    let source_directory = args
        .get(1)
        .expect("CLI argument representing directory to put in the bag");
    let bag_path = args
        .get(2)
        .expect("CLI argument representing path where bag will be created");

    let mut profile_path = std::path::PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    profile_path.push("tests/fixtures/profile.json");
    let profile = BagItProfile::load(profile_path).await?;

    let mut bagger = Bagger::new(bag_path, &profile);
    let added = bagger.add_payload_directory(source_directory).await?;
    println!("Adding {added} files from `{source_directory}` to bag");

    bagger.add_tag("bag-info.txt", "Source-Organization", "Bag Makers Inc.")?;
    bagger.add_tag("bag-info.txt", "Access", "Institution")?;

    // Overwrite the bag of a previous run
    if !bagger.write_bag(true, true).await {
        for error in bagger.errors() {
            eprintln!("{error}");
        }
        return Err("Failed to create bag".into());
    }

    println!("Your new bag is available at `{bag_path}`");

    Ok(())
}
