//! Plain-text report writers. Everything lands as small CSV files plus
//! a JSON parameter record, one directory per run.

use anyhow::Context;

use crate::model::params::Params;
use crate::model::tb::Trajectory;
use crate::sensitivity::local::{LocalSensitivityTable, SweepTable};
use crate::sensitivity::sobol::SobolIndices;

fn create_file(
    out_dir: impl AsRef<std::path::Path>,
    name: &str,
) -> anyhow::Result<(std::fs::File, std::path::PathBuf)> {
    std::fs::create_dir_all(out_dir.as_ref()).context("create output dir failed")?;
    let path = out_dir.as_ref().join(name);
    let f = std::fs::File::create(&path)
        .with_context(|| format!("create report file failed (path={:?})", path))?;
    Ok((f, path))
}

/// Parameter record for a run, as a single JSON object.
pub fn write_params_json(
    out_dir: impl AsRef<std::path::Path>,
    name: &str,
    params: &Params,
) -> anyhow::Result<std::path::PathBuf> {
    use std::io::Write;

    let (mut f, path) = create_file(out_dir, name)?;
    let line = serde_json::to_string_pretty(params).context("serialize params failed")?;
    writeln!(f, "{}", line)?;
    Ok(path)
}

pub fn write_trajectory_csv(
    out_dir: impl AsRef<std::path::Path>,
    name: &str,
    traj: &Trajectory,
) -> anyhow::Result<std::path::PathBuf> {
    use std::io::Write;

    anyhow::ensure!(!traj.is_empty(), "empty trajectory");
    let (mut f, path) = create_file(out_dir, name)?;

    writeln!(f, "t_days,Sj,Ej,Ij,Sa,Ea,Ia,N")?;
    for (t, s) in traj {
        writeln!(
            f,
            "{:.6},{:.6},{:.6},{:.6},{:.6},{:.6},{:.6},{:.6}",
            t,
            s.sj,
            s.ej,
            s.ij,
            s.sa,
            s.ea,
            s.ia,
            s.total()
        )?;
    }
    Ok(path)
}

/// One row per (time, output, parameter) elasticity.
pub fn write_local_csv(
    out_dir: impl AsRef<std::path::Path>,
    name: &str,
    table: &LocalSensitivityTable,
) -> anyhow::Result<std::path::PathBuf> {
    use std::io::Write;

    let (mut f, path) = create_file(out_dir, name)?;
    writeln!(f, "t_days,output,param,elasticity")?;
    for (t_idx, t) in table.times.iter().enumerate() {
        for (o_idx, output) in table.outputs.iter().enumerate() {
            for (p_idx, param) in table.params.iter().enumerate() {
                writeln!(
                    f,
                    "{:.6},{},{},{:.6e}",
                    t,
                    output.label(),
                    param,
                    table.coeff(t_idx, o_idx, p_idx)
                )?;
            }
        }
    }
    Ok(path)
}

/// Sweep results with missing entries written as `NA`.
pub fn write_sweep_csv(
    out_dir: impl AsRef<std::path::Path>,
    name: &str,
    table: &SweepTable,
) -> anyhow::Result<std::path::PathBuf> {
    use std::io::Write;

    anyhow::ensure!(
        table.values.len() == table.rel_changes.len(),
        "sweep row count mismatch"
    );
    let (mut f, path) = create_file(out_dir, name)?;

    write!(f, "change_pct")?;
    for output in &table.outputs {
        write!(f, ",{}_pct", output.label())?;
    }
    writeln!(f)?;

    for (change, row) in table.rel_changes.iter().zip(&table.values) {
        write!(f, "{:.2}", 100.0 * change)?;
        for cell in row {
            match cell {
                Some(v) => write!(f, ",{:.6}", v)?,
                None => write!(f, ",NA")?,
            }
        }
        writeln!(f)?;
    }
    Ok(path)
}

pub fn write_sobol_csv(
    out_dir: impl AsRef<std::path::Path>,
    name: &str,
    indices: &SobolIndices,
) -> anyhow::Result<std::path::PathBuf> {
    use std::io::Write;

    let (mut f, path) = create_file(out_dir, name)?;
    writeln!(f, "output,t_days,param,si,si_lo,si_hi,ti,ti_lo,ti_hi")?;
    for r in &indices.rows {
        writeln!(
            f,
            "{},{:.6},{},{:.6},{:.6},{:.6},{:.6},{:.6},{:.6}",
            r.output.label(),
            r.time,
            r.param,
            r.si,
            r.si_lo,
            r.si_hi,
            r.ti,
            r.ti_lo,
            r.ti_hi
        )?;
    }
    Ok(path)
}
