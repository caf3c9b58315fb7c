//! surfd binary entry point.

fn main() -> anyhow::Result<()> {
    surfd::cli::run()
}
