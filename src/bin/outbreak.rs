use possumtb::io::report::{
    write_local_csv, write_params_json, write_sobol_csv, write_sweep_csv, write_trajectory_csv,
};
use possumtb::model::tb::{display_grid, sensitivity_grid};
use possumtb::r0::r0;
use possumtb::sensitivity::local::{local_sensitivity, perturbation_sweep, LocalConfig};
use possumtb::sensitivity::sobol::{sobol_indices, SobolConfig};
use possumtb::sensitivity::OutputVar;
use possumtb::{Params, Scenario, TbModel, TbState};

fn main() -> anyhow::Result<()> {
    let scenario: Scenario = std::env::var("SCENARIO")
        .unwrap_or_else(|_| "base".to_string())
        .parse()?;
    let out_dir = std::env::var("OUT_DIR").unwrap_or_else(|_| "out".to_string());

    let params = Params::scenario(scenario);
    let init = TbState::seeded();

    println!("scenario={scenario:?}");
    write_params_json(&out_dir, "params.json", &params)?;

    // 20-year outbreak trajectory
    let model = TbModel::new(params)?;
    let traj = model.simulate(&init, &display_grid())?;
    let path = write_trajectory_csv(&out_dir, "trajectory.csv", &traj)?;
    println!("trajectory -> {path:?}");

    let (_, last) = traj.last().unwrap();
    println!(
        "N(20y)={:.2}  infectious={:.2}",
        last.total(),
        last.ij + last.ia
    );
    println!("R0={:.4}", r0(&init, &params)?);

    // Local elasticities over the first 7 years
    let table = local_sensitivity(&params, &init, &sensitivity_grid(), &LocalConfig::default())?;
    let path = write_local_csv(&out_dir, "local_sensitivity.csv", &table)?;
    println!("local sensitivity -> {path:?}");

    // What-if ladder on the adult contact rate
    let sweep = perturbation_sweep(
        &params,
        &init,
        &sensitivity_grid(),
        "rba",
        &[-0.5, -0.25, -0.1, 0.1, 0.25, 0.5],
        &[OutputVar::Ia, OutputVar::Total],
    )?;
    let path = write_sweep_csv(&out_dir, "sweep_rba.csv", &sweep)?;
    println!("perturbation sweep -> {path:?}");

    // Global variance decomposition at 2 and 7 years
    let cfg = SobolConfig::new(
        128,
        vec![2.0 * 365.0, 7.0 * 365.0],
        vec![OutputVar::Ia, OutputVar::Total],
    );
    let indices = sobol_indices(&params, &init, &cfg)?;
    let path = write_sobol_csv(&out_dir, "sobol_indices.csv", &indices)?;
    println!("sobol indices ({} base samples) -> {path:?}", indices.samples);

    Ok(())
}
