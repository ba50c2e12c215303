//! Demo Artifact Generator
//!
//! Writes a logistic regression pipeline and a random forest pipeline over
//! the 14 KOI features so the API can run without a training environment.
//! The artifacts mimic an older training library: they are stamped with an
//! older version and lack the attributes the current runtime expects, so
//! loading them exercises the compatibility patcher.

use anyhow::{Context, Result};
use exoplanet_classifier::{
    config::AppConfig,
    models::artifact::{ClassLabel, Estimator, ModelArtifact, Node, NodeId, Step, Tree},
    models::ModelRegistry,
    types::features::FEATURE_NAMES,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::fs;
use std::path::Path;
use tracing::info;

const LIBRARY_VERSION: &str = "1.2.2";
const RAW_CLASSES: [&str; 3] = ["CANDIDATE", "CONFIRMED", "FALSE POSITIVE"];

/// Typical value and spread of each feature, in `FEATURE_NAMES` order
const FEATURE_STATS: [(f64, f64); 14] = [
    (10.0, 50.0),     // koi_period
    (3.5, 3.0),       // koi_duration
    (400.0, 5000.0),  // koi_depth
    (2.3, 10.0),      // koi_prad
    (25.0, 100.0),    // koi_model_snr
    (25.0, 100.0),    // koi_snr
    (0.5, 0.45),      // koi_score
    (0.03, 0.1),      // koi_ror
    (0.5, 1.0),       // koi_impact
    (15.0, 200.0),    // koi_max_mult_ev
    (0.0, 0.5),       // koi_fpflag_ss
    (0.0, 0.5),       // koi_fpflag_co
    (0.0, 0.5),       // koi_fpflag_nt
    (0.0, 0.5),       // koi_fpflag_ec
];

fn feature_names() -> Vec<String> {
    FEATURE_NAMES.iter().map(|f| f.to_string()).collect()
}

fn classes() -> Vec<ClassLabel> {
    RAW_CLASSES.iter().map(|c| ClassLabel::from(*c)).collect()
}

fn imputer() -> Node {
    Node::new(Estimator::SimpleImputer {
        statistics: FEATURE_STATS.iter().map(|(median, _)| Some(*median)).collect(),
        feature_names_in: Some(feature_names()),
    })
}

/// Generator for synthetic fitted estimators
struct ArtifactGenerator {
    rng: StdRng,
}

impl ArtifactGenerator {
    fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Imputer, scaler and multinomial logistic regression
    fn logistic_regression(&mut self) -> ModelArtifact {
        let coef: Vec<Vec<f64>> = (0..RAW_CLASSES.len())
            .map(|class| {
                FEATURE_NAMES
                    .iter()
                    .map(|name| {
                        let noise: f64 = self.rng.gen_range(-0.3..0.3);
                        noise + class_bias(class, name)
                    })
                    .collect::<Vec<f64>>()
            })
            .collect();

        ModelArtifact {
            library_version: LIBRARY_VERSION.to_string(),
            root: NodeId(0),
            nodes: vec![
                Node::new(Estimator::Pipeline {
                    steps: vec![
                        step("imputer", 1),
                        step("scaler", 2),
                        step("classifier", 3),
                    ],
                    feature_names_in: None,
                }),
                imputer(),
                Node::new(Estimator::StandardScaler {
                    mean: Some(FEATURE_STATS.iter().map(|(median, _)| *median).collect()),
                    scale: Some(FEATURE_STATS.iter().map(|(_, spread)| *spread).collect()),
                    feature_names_in: Some(feature_names()),
                }),
                Node::new(Estimator::LogisticRegression {
                    coef,
                    intercept: vec![
                        self.rng.gen_range(-0.2..0.2),
                        self.rng.gen_range(-0.2..0.2),
                        self.rng.gen_range(-0.2..0.2),
                    ],
                    classes: classes(),
                    feature_names_in: None,
                }),
            ],
        }
    }

    /// Imputer followed by a forest of depth-2 trees
    fn random_forest(&mut self, n_trees: usize) -> ModelArtifact {
        let first_tree = 3;
        let mut nodes = vec![
            Node::new(Estimator::Pipeline {
                steps: vec![step("imputer", 1), step("classifier", 2)],
                feature_names_in: None,
            }),
            imputer(),
            Node::new(Estimator::RandomForestClassifier {
                fitted: (first_tree..first_tree + n_trees).map(NodeId).collect(),
                estimator: None,
                classes: classes(),
                feature_names_in: Some(feature_names()),
            }),
        ];
        for _ in 0..n_trees {
            let tree = self.tree();
            nodes.push(Node::new(Estimator::DecisionTreeClassifier {
                tree,
                classes: classes(),
                feature_names_in: None,
            }));
        }

        ModelArtifact {
            library_version: LIBRARY_VERSION.to_string(),
            root: NodeId(0),
            nodes,
        }
    }

    fn tree(&mut self) -> Tree {
        let splits: Vec<(i64, f64)> = (0..3).map(|_| self.split()).collect();
        let leaves: Vec<Vec<f64>> = (0..4).map(|_| self.leaf()).collect();

        let mut value = vec![vec![0.0; RAW_CLASSES.len()]; 3];
        for (i, leaf) in leaves.iter().enumerate() {
            for (class, weight) in leaf.iter().enumerate() {
                value[1 + i / 2][class] += weight;
                value[0][class] += weight;
            }
        }
        value.extend(leaves);

        Tree {
            children_left: vec![1, 3, 5, -1, -1, -1, -1],
            children_right: vec![2, 4, 6, -1, -1, -1, -1],
            feature: splits
                .iter()
                .map(|(f, _)| *f)
                .chain(std::iter::repeat(-2).take(4))
                .collect(),
            threshold: splits
                .iter()
                .map(|(_, t)| *t)
                .chain(std::iter::repeat(-2.0).take(4))
                .collect(),
            value,
            missing_go_to_left: None,
        }
    }

    fn split(&mut self) -> (i64, f64) {
        let feature = self.rng.gen_range(0..FEATURE_NAMES.len());
        let (median, spread) = FEATURE_STATS[feature];
        let offset: f64 = self.rng.gen_range(-0.5..0.5);
        let threshold = median + spread * offset;
        (feature as i64, threshold)
    }

    fn leaf(&mut self) -> Vec<f64> {
        let favoured = self.rng.gen_range(0..RAW_CLASSES.len());
        (0..RAW_CLASSES.len())
            .map(|class| {
                let base: f64 = self.rng.gen_range(1.0..10.0);
                if class == favoured {
                    base * 4.0
                } else {
                    base
                }
            })
            .collect()
    }
}

/// Vetting flags push towards FALSE POSITIVE, the disposition score
/// towards CONFIRMED.
fn class_bias(class: usize, feature: &str) -> f64 {
    match (RAW_CLASSES[class], feature) {
        ("FALSE POSITIVE", f) if f.starts_with("koi_fpflag") => 2.0,
        ("CONFIRMED", "koi_score") => 1.5,
        ("FALSE POSITIVE", "koi_score") => -1.5,
        _ => 0.0,
    }
}

fn step(name: &str, node: usize) -> Step {
    Step {
        name: name.to_string(),
        node: NodeId(node),
    }
}

fn write_artifact(dir: &Path, filename: &str, artifact: &ModelArtifact) -> Result<()> {
    let path = dir.join(filename);
    let json = artifact.to_json_pretty()?;
    fs::write(&path, json).with_context(|| format!("Failed to write {}", path.display()))?;
    info!(
        path = %path.display(),
        nodes = artifact.nodes.len(),
        library_version = %artifact.library_version,
        "Artifact written"
    );
    Ok(())
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("demo_artifacts=info".parse()?)
                .add_directive("exoplanet_classifier=info".parse()?),
        )
        .init();

    info!("Starting Demo Artifact Generator");

    // Parse arguments
    let args: Vec<String> = std::env::args().collect();
    let mut models = AppConfig::default().models;
    if let Some(dir) = args.get(1) {
        models.models_dir = dir.clone();
    }
    let n_trees: usize = args.get(2).and_then(|s| s.parse().ok()).unwrap_or(25);
    let seed: u64 = args.get(3).and_then(|s| s.parse().ok()).unwrap_or(42);

    info!(
        models_dir = %models.models_dir,
        n_trees = n_trees,
        seed = seed,
        "Configuration loaded"
    );

    let dir = Path::new(&models.models_dir);
    fs::create_dir_all(dir).with_context(|| format!("Failed to create {}", dir.display()))?;

    let mut generator = ArtifactGenerator::new(seed);
    for (selector, filename) in &models.artifacts {
        let artifact = match selector.as_str() {
            "lr" => generator.logistic_regression(),
            "rf" => generator.random_forest(n_trees),
            other => anyhow::bail!("no demo artifact for selector '{other}'"),
        };
        write_artifact(dir, filename, &artifact)?;
    }

    // Load back through the registry so patching and validation run.
    let registry = ModelRegistry::load(&models)?;
    let report = registry.version_report();
    info!(
        "Completed! {} artifacts load cleanly:\n{}",
        registry.len(),
        serde_json::to_string_pretty(&report)?
    );

    Ok(())
}
