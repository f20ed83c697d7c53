use anyhow::Result;

mod app;
mod logging;

fn main() -> Result<()> {
    let args = shelf_move::cli::parse();
    app::run(args)
}
