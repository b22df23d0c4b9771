//! 多次独立重复的加权随机仿真.
//!
//! 每次重复从初始标识出发，使用网的独立副本与 `seed + i` 播种的生成器，
//! 各重复之间由 rayon 并行执行。统计量为每个库所的时间平均令牌数。
use rayon::prelude::*;

pub use crate::config::SimulationConfig;
use crate::net::{Net, NetError};

/// 95% two-sided normal quantile.
const Z_95: f64 = 1.96;

#[derive(Debug, Clone, PartialEq)]
pub struct PlaceStatistics {
    pub place: String,
    /// Mean over replications of the time-averaged token count.
    pub mean: f64,
    /// Half-width of the 95% confidence interval around `mean`.
    pub half_width: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SimulationReport {
    pub places: Vec<PlaceStatistics>,
    pub replications: usize,
    /// Firings performed across all replications.
    pub firings: usize,
}

impl SimulationReport {
    pub fn place(&self, id: &str) -> Option<&PlaceStatistics> {
        self.places.iter().find(|s| s.place.eq_ignore_ascii_case(id))
    }
}

#[derive(Debug)]
struct Replication {
    averages: Vec<f64>,
    firings: usize,
}

/// Runs `config.replications` experiments of up to `config.firings` weighted
/// random firings each. An experiment ends early once nothing is enabled.
pub fn simulate(net: &Net, config: &SimulationConfig) -> Result<SimulationReport, NetError> {
    let copies: Vec<Net> = (0..config.replications).map(|_| net.detached()).collect();
    let runs = copies
        .into_par_iter()
        .enumerate()
        .map(|(index, copy)| replicate(copy, config.firings, config.seed.wrapping_add(index as u64)))
        .collect::<Result<Vec<_>, _>>()?;

    let places = net
        .places()
        .iter()
        .enumerate()
        .map(|(idx, place)| {
            let samples: Vec<f64> = runs.iter().map(|run| run.averages[idx]).collect();
            let (mean, half_width) = mean_and_half_width(&samples);
            PlaceStatistics {
                place: place.id.clone(),
                mean,
                half_width,
            }
        })
        .collect();
    let firings = runs.iter().map(|run| run.firings).sum();
    log::info!(
        "simulation finished: {} replications, {firings} firings",
        runs.len()
    );
    Ok(SimulationReport {
        places,
        replications: runs.len(),
        firings,
    })
}

fn replicate(mut net: Net, firings: usize, seed: u64) -> Result<Replication, NetError> {
    net.reseed(seed);
    net.restore_initial_marking();
    let mut sums: Vec<f64> = net
        .current_marking()
        .iter()
        .map(|(_, tokens)| tokens as f64)
        .collect();
    let mut visited = 1usize;
    let mut fired = 0;
    for _ in 0..firings {
        if net.fire_random_weighted()?.is_none() {
            log::debug!("replication seeded {seed} dead after {fired} firings");
            break;
        }
        fired += 1;
        visited += 1;
        for (sum, (_, tokens)) in sums.iter_mut().zip(net.current_marking().iter()) {
            *sum += tokens as f64;
        }
    }
    Ok(Replication {
        averages: sums.into_iter().map(|sum| sum / visited as f64).collect(),
        firings: fired,
    })
}

fn mean_and_half_width(samples: &[f64]) -> (f64, f64) {
    let n = samples.len();
    if n == 0 {
        return (0.0, 0.0);
    }
    let mean = samples.iter().sum::<f64>() / n as f64;
    if n == 1 {
        return (mean, 0.0);
    }
    let variance = samples.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / (n - 1) as f64;
    (mean, Z_95 * variance.sqrt() / (n as f64).sqrt())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::{Arc, Place, Transition};

    fn cycle() -> Net {
        let mut net = Net::seeded(0);
        net.add_place(Place::new("a").with_marking(1));
        net.add_place(Place::new("b"));
        net.add_transition(Transition::new("go"));
        net.add_transition(Transition::new("back"));
        net.add_arc(Arc::normal("P0", "T0", 1));
        net.add_arc(Arc::normal("T0", "P1", 1));
        net.add_arc(Arc::normal("P1", "T1", 1));
        net.add_arc(Arc::normal("T1", "P0", 1));
        net
    }

    #[test]
    fn deterministic_cycle_averages() {
        let config = SimulationConfig {
            firings: 100,
            replications: 4,
            seed: 9,
        };
        let report = simulate(&cycle(), &config).unwrap();
        assert_eq!(report.replications, 4);
        assert_eq!(report.firings, 400);
        let a = report.place("P0").unwrap();
        assert!((a.mean - 51.0 / 101.0).abs() < 1e-12);
        assert!(a.half_width.abs() < 1e-12);
    }

    #[test]
    fn dead_net_stops_early_and_starts_from_initial_marking() {
        let mut net = Net::seeded(0);
        net.add_place(Place::new("a").with_marking(1));
        net.add_place(Place::new("b"));
        net.add_transition(Transition::new("once"));
        net.add_arc(Arc::normal("P0", "T0", 1));
        net.add_arc(Arc::normal("T0", "P1", 1));
        net.fire(crate::net::TransitionId::new(0)).unwrap();

        let config = SimulationConfig {
            firings: 50,
            replications: 1,
            seed: 0,
        };
        let report = simulate(&net, &config).unwrap();
        assert_eq!(report.firings, 1);
        assert_eq!(report.place("P1").unwrap().mean, 0.5);
        assert_eq!(net.current_marking().as_slice(), &[0, 1]);
    }

    #[test]
    fn invalid_rate_aborts() {
        let mut net = cycle();
        net.set_rate("T0", -1.0).unwrap();
        assert!(matches!(
            simulate(&net, &SimulationConfig::default()),
            Err(NetError::InvalidRate { .. })
        ));
    }

    #[test]
    fn half_width_formula() {
        let (mean, half) = mean_and_half_width(&[1.0, 3.0]);
        assert_eq!(mean, 2.0);
        assert!((half - Z_95 * 2f64.sqrt() / 2f64.sqrt()).abs() < 1e-12);
    }
}
