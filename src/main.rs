use rocket_kubeconfig::PortalState;
use rocket_kubeconfig::config::PortalConfig;
use std::path::PathBuf;
use structopt::StructOpt;

#[derive(Debug, Clone, StructOpt)]
#[structopt(about = "Issues kubeconfig files to users signed in through OpenID Connect")]
pub struct Args {
    /// YAML config file, GANGWAY_* environment variables override its values
    #[structopt(short, long, parse(from_os_str))]
    config: Option<PathBuf>,
}

#[rocket::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::from_args();

    let mut config = match &args.config {
        Some(path) => PortalConfig::from_yaml_file(path)?,
        None => PortalConfig::default(),
    };
    config.apply_env()?;

    let state = PortalState::from_config(config)?;
    let _rocket = rocket_kubeconfig::setup(rocket::build(), state)
        .launch()
        .await?;
    Ok(())
}
