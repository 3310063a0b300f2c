use clap::crate_version;
use log::info;

pub fn write_header() {
    info!("{: ^80}", "-----------------");
    info!("{: ^80}", "BEMB");
    info!("{: ^80}", "-----------------");
    let mut version_string: String = "version: ".to_owned();
    version_string.push_str(crate_version!());
    info!("{: ^80}", version_string);
    info!("{: ^80}", "");
    info!("{: ^80}", "::::::::::::::::::::::::::::::::::::::");
    info!("{: ^80}", "::       Bootstrap Embedding        ::");
    info!("{: ^80}", "::   overlapping fragments matched  ::");
    info!("{: ^80}", "::      by one-body potentials      ::");
    info!("{: ^80}", "::::::::::::::::::::::::::::::::::::::");
    info!("{: ^80}", "");
}
