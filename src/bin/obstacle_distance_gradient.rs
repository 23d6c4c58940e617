// Obstacle distance gradient demo
//
// Folds a two-link planar arm back onto its base and scores the motion with
// the obstacle distance gradient and collision check cost functions. Noisy
// rollouts around the nominal trajectory are scored in parallel.
//
// Run with RUST_LOG=debug to see the cost function lifecycle.

use std::error::Error;
use std::f64::consts::PI;
use std::sync::Arc;
use std::thread;

use gnuplot::{AxesCommon, Caption, Color, Figure};
use log::info;
use nalgebra::{DMatrix, Isometry3, Point3, Vector3};
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand_distr::{Distribution, Normal};
use serde_json::json;

use stomp_costs::robot::{CollisionShape, Joint, RobotModel, RobotModelBuilder, RobotStateMsg};
use stomp_costs::scene::{MotionPlanRequest, PlanningScene, StompConfiguration};
use stomp_costs::{CostFunction, CostFunctionRegistry, CostFunctionResult};

const GROUP: &str = "arm";
const NUM_TIMESTEPS: usize = 60;
const NUM_ROLLOUTS: usize = 4;
const NOISE_STDDEV: f64 = 0.15;

fn planar_arm() -> CostFunctionResult<RobotModel> {
    RobotModelBuilder::new("planar_arm")
        .link("base", vec![CollisionShape::sphere(Point3::origin(), 0.1)])
        .link(
            "upper_arm",
            vec![CollisionShape::capsule(Point3::origin(), Point3::new(0.5, 0.0, 0.0), 0.05)],
        )
        .link(
            "forearm",
            vec![CollisionShape::capsule(Point3::origin(), Point3::new(0.4, 0.0, 0.0), 0.05)],
        )
        .joint(Joint::revolute("shoulder", "base", "upper_arm", Isometry3::identity(), Vector3::z()))
        .joint(Joint::revolute(
            "elbow",
            "upper_arm",
            "forearm",
            Isometry3::translation(0.5, 0.0, 0.0),
            Vector3::z(),
        ))
        .group(GROUP, &["shoulder", "elbow"])
        .build()
}

/// Shoulder held still while the elbow folds from 0 to pi
fn elbow_sweep() -> DMatrix<f64> {
    DMatrix::from_fn(2, NUM_TIMESTEPS, |joint, t| {
        if joint == 0 {
            0.0
        } else {
            PI * t as f64 / (NUM_TIMESTEPS - 1) as f64
        }
    })
}

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();

    let model = Arc::new(planar_arm()?);
    let scene = PlanningScene::new(Arc::clone(&model));
    let config = json!({
        "cost_functions": [
            {"class": "ObstacleDistanceGradient", "cost_weight": 1.0, "voxel_size": 0.02, "max_distance": 0.1},
            {"class": "CollisionCheck", "cost_weight": 10.0, "voxel_size": 0.02, "max_distance": 0.1}
        ]
    });
    let mut registry = CostFunctionRegistry::from_config(Arc::clone(&model), GROUP, &config)?;

    let request = MotionPlanRequest::new(GROUP, RobotStateMsg::new(&["shoulder", "elbow"], &[0.0, 0.0]));
    let stomp_config = StompConfiguration {
        num_timesteps: NUM_TIMESTEPS,
        num_rollouts: NUM_ROLLOUTS,
        ..StompConfiguration::with_dimensions(2)
    };
    registry.set_motion_plan_request(&scene, &request, &stomp_config)?;

    let nominal = elbow_sweep();
    let nominal_eval = registry.compute_costs(&nominal, 0, NUM_TIMESTEPS, 0, 0)?;
    let mut per_term = Vec::new();
    for cost_function in registry.iter() {
        let mut fork = cost_function.fork();
        fork.set_motion_plan_request(&scene, &request, &stomp_config)?;
        let eval = fork.compute_costs(&nominal, 0, NUM_TIMESTEPS, 0, 0)?;
        per_term.push((cost_function.name().to_string(), eval.costs));
    }
    println!(
        "nominal trajectory: total cost {:.3}, valid {}",
        nominal_eval.total(),
        nominal_eval.validity
    );

    // each rollout worker owns a fork of the registry
    let noise = Normal::new(0.0, NOISE_STDDEV)?;
    let mut rng = StdRng::seed_from_u64(42);
    let rollouts: Vec<DMatrix<f64>> = (0..NUM_ROLLOUTS)
        .map(|_| nominal.map(|q| q + noise.sample(&mut rng)))
        .collect();
    let rollout_evals = thread::scope(|s| {
        let handles: Vec<_> = rollouts
            .iter()
            .enumerate()
            .map(|(k, rollout)| {
                let mut worker = registry.fork();
                let scene = &scene;
                let request = &request;
                let stomp_config = &stomp_config;
                s.spawn(move || -> CostFunctionResult<_> {
                    worker.set_motion_plan_request(scene, request, stomp_config)?;
                    let eval = worker.compute_costs(rollout, 0, NUM_TIMESTEPS, 1, k)?;
                    worker.done(true, 1, eval.total());
                    Ok(eval)
                })
            })
            .collect();
        handles
            .into_iter()
            .map(|h| h.join().map_err(|_| "rollout worker panicked"))
            .collect::<Result<Vec<_>, _>>()
    })?;
    for (k, eval) in rollout_evals.iter().enumerate() {
        let eval = eval.as_ref().map_err(|e| e.to_string())?;
        println!("rollout {}: total cost {:.3}, valid {}", k, eval.total(), eval.validity);
    }

    registry.done(true, 1, nominal_eval.total());
    info!("scored {} rollouts", NUM_ROLLOUTS);

    let elbow: Vec<f64> = nominal.row(1).iter().copied().collect();
    let mut fg = Figure::new();
    {
        let axes = fg.axes2d();
        axes.set_title("Self-collision costs of an elbow sweep", &[])
            .set_x_label("elbow angle [rad]", &[])
            .set_y_label("cost", &[]);
        let colors = ["blue", "red"];
        for ((name, costs), color) in per_term.iter().zip(colors.iter()) {
            axes.lines(&elbow, costs.iter(), &[Caption(name.as_str()), Color(*color)]);
        }
    }
    match fg.save_to_svg("./img/stomp/obstacle_distance_gradient.svg", 640, 480) {
        Ok(_) => println!("Plot saved to ./img/stomp/obstacle_distance_gradient.svg"),
        Err(e) => eprintln!("Failed to save SVG: {:?}", e),
    }
    Ok(())
}
