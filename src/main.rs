use anyhow::Result;

mod window;

fn main() -> Result<()> {
    pretty_env_logger::init();

    let config_path = std::env::args().nth(1);
    pollster::block_on(window::run(config_path))?;

    Ok(())
}
