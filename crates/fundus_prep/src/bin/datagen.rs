use clap::Parser;
use fundus_prep::{run_datagen, DatagenArgs};

fn main() -> anyhow::Result<()> {
    run_datagen(DatagenArgs::parse())
}
