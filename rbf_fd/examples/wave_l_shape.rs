use rbf_fd::{
    config::{IntegratorParams, StencilParams, WaveParams},
    geometry::PolygonDomain,
    progress::{closure_sink, ProgressMsg},
    WaveSimulation,
};
use std::{fs, path::Path};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Print progress from a listener thread
    let (sink, listener) = closure_sink(256, |msg: ProgressMsg| println!("{msg}"));

    // L-shaped domain [0,2]^2 minus (1,2]^2 with a free (zero normal derivative) boundary
    let domain = PolygonDomain::l_shape();

    let params = WaveParams::builder()
        .stencil(StencilParams::builder(30).build())
        .integrator(IntegratorParams::builder().max_steps(1000).build())
        .build();

    let sim = WaveSimulation::builder(domain, 50_000)
        .params(params)
        .progress_callback(sink.clone())
        .build()?;

    // Start from rest with a narrow bump at (0.5, 0.5)
    let u0 = sim.radial_bump([0.5, 0.5], 0.05);
    let v0 = vec![0.0; u0.len()];
    let state = sim.initial_state(&u0, &v0)?;

    let times: Vec<f64> = (0..5).map(|i| 0.5 * i as f64).collect();
    let solution = sim.run(&state, &times)?;

    let out = Path::new("figures");
    fs::create_dir_all(out)?;
    solution.write_csv(out, "wave")?;
    solution.save_json(out.join("wave.json"))?;

    drop(sink);
    drop(sim);
    listener.join().ok();

    Ok(())
}
