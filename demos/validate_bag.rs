//! Run this example with the following command in a terminal:
//!
//! ```console
//! $ cargo run --example validate_bag -- /tmp/my-bag.tar ./tests/fixtures/profile.json
//! ```

use async_bagit::{BagItProfile, Validator};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args: Vec<String> = std::env::args().collect();
    let bag_path = args
        .get(1)
        .expect("CLI argument representing path to a bag directory or tar file");
    let profile_path = args
        .get(2)
        .expect("CLI argument representing path to a BagIt profile");

    let profile = BagItProfile::load(profile_path).await?;

    let mut validator = Validator::new(bag_path, &profile);
    if !validator.validate().await {
        println!("Bag `{bag_path}` is not valid:");
        for error in validator.errors() {
            println!("- {error}");
        }
        return Ok(());
    }

    let bag = validator.bag();
    println!(
        "Bag `{bag_path}` is valid: {} payload files, Payload-Oxum {}",
        bag.payload.len(),
        bag.payload_oxum()
    );
    for (rel_path, file) in &bag.payload {
        let checksums = file
            .checksums
            .iter()
            .map(|(algorithm, checksum)| format!("{algorithm}:{checksum}"))
            .collect::<Vec<_>>();
        println!("{rel_path} {}", checksums.join(" "));
    }

    Ok(())
}
