use anyhow::{Context, Result};
use bemb::io::{read_input, write_header};
use bemb::system::{IntegralProvider, ModelSystem};
use bemb::utils::Timer;
use bemb::{BootstrapEmbedding, System};
use clap::{crate_version, App, Arg};
use env_logger::Env;
use log::info;
use std::io::Write;

fn main() -> Result<()> {
    let matches = App::new("bemb")
        .version(crate_version!())
        .about("bootstrap embedding of lattice models")
        .arg(
            Arg::new("model")
                .help("TOML file with the lattice model")
                .required(true)
                .index(1),
        )
        .arg(
            Arg::new("oneshot")
                .long("oneshot")
                .help("solve the fragments once without matching"),
        )
        .get_matches();

    env_logger::Builder::from_env(Env::default().default_filter_or("info"))
        .format(|buf, record| writeln!(buf, "{}", record.args()))
        .init();
    let timer: Timer = Timer::start("total wall time:");
    write_header();

    let model_file: &str = matches.value_of("model").context("no model file given")?;
    let (model, config) = read_input(model_file)?;
    info!(
        "{: <25} {} sites, t = {}, U = {}",
        "lattice model:", model.n_sites, model.hopping, model.hubbard_u
    );
    let provider: ModelSystem = model.build().context("unable to set up the model")?;
    let mut system: System = System::from_provider(&provider)?;
    if config.frozen_core {
        system = system.freeze_core(&provider.core_orbitals())?;
    }

    let mut driver: BootstrapEmbedding = BootstrapEmbedding::new(&system, &config)?;
    if matches.is_present("oneshot") {
        driver.oneshot()?;
    } else {
        driver.run()?;
    }
    info!("{}", timer);
    Ok(())
}
