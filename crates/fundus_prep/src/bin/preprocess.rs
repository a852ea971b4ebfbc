use clap::Parser;
use fundus_prep::{run_preprocess, PreprocessArgs};

fn main() -> anyhow::Result<()> {
    run_preprocess(PreprocessArgs::parse())
}
