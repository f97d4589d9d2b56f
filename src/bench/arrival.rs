//! Open-loop Poisson arrivals.

use rand::Rng;
use rand_distr::{Distribution, Exp};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{Result, RouterError};

/// Target arrival rate in requests per second
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum RequestRate {
    Finite(f64),
    /// Issue everything at once
    Infinite,
}

impl std::fmt::Display for RequestRate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RequestRate::Finite(rate) => write!(f, "{}", rate),
            RequestRate::Infinite => write!(f, "inf"),
        }
    }
}

impl std::str::FromStr for RequestRate {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "inf" | "infinity" => Ok(RequestRate::Infinite),
            other => {
                let rate: f64 = other
                    .parse()
                    .map_err(|_| format!("Invalid request rate: {}", s))?;
                if rate.is_infinite() && rate > 0.0 {
                    Ok(RequestRate::Infinite)
                } else if rate.is_finite() && rate > 0.0 {
                    Ok(RequestRate::Finite(rate))
                } else {
                    Err(format!("Request rate must be positive: {}", s))
                }
            }
        }
    }
}

/// Draws inter-arrival delays for a target rate.
///
/// Delays are i.i.d. exponential with mean `1 / rate`; an infinite rate gives
/// zero delay every time.
#[derive(Debug, Clone)]
pub struct ArrivalProcess {
    interval: Option<Exp<f64>>,
}

impl ArrivalProcess {
    pub fn new(rate: RequestRate) -> Result<Self> {
        let interval = match rate {
            RequestRate::Infinite => None,
            RequestRate::Finite(rate) => {
                if !(rate.is_finite() && rate > 0.0) {
                    return Err(RouterError::Configuration(format!(
                        "request rate must be positive, got {}",
                        rate
                    )));
                }
                let exp = Exp::new(rate).map_err(|e| {
                    RouterError::Configuration(format!("invalid request rate {}: {}", rate, e))
                })?;
                Some(exp)
            }
        };
        Ok(Self { interval })
    }

    /// Delay before the next issuance
    pub fn next_delay<R: Rng + ?Sized>(&self, rng: &mut R) -> Duration {
        match &self.interval {
            None => Duration::ZERO,
            Some(exp) => Duration::from_secs_f64(exp.sample(rng)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_parse_request_rate() {
        assert_eq!("inf".parse::<RequestRate>().unwrap(), RequestRate::Infinite);
        assert_eq!("Infinity".parse::<RequestRate>().unwrap(), RequestRate::Infinite);
        assert_eq!("2.5".parse::<RequestRate>().unwrap(), RequestRate::Finite(2.5));
        assert!("0".parse::<RequestRate>().is_err());
        assert!("-1".parse::<RequestRate>().is_err());
        assert!("fast".parse::<RequestRate>().is_err());
        assert_eq!(RequestRate::Infinite.to_string(), "inf");
    }

    #[test]
    fn test_mean_interval_converges_to_inverse_rate() {
        let process = ArrivalProcess::new(RequestRate::Finite(4.0)).unwrap();
        let mut rng = StdRng::seed_from_u64(7);

        let draws = 200_000;
        let total: f64 = (0..draws)
            .map(|_| process.next_delay(&mut rng).as_secs_f64())
            .sum();
        let mean = total / draws as f64;
        // Standard error is 0.25 / sqrt(200k) ~ 0.00056
        assert!((mean - 0.25).abs() < 0.005, "mean interval {}", mean);
    }

    #[test]
    fn test_infinite_rate_has_no_delay() {
        let process = ArrivalProcess::new(RequestRate::Infinite).unwrap();
        let mut rng = StdRng::seed_from_u64(1);
        assert!((0..1000).all(|_| process.next_delay(&mut rng).is_zero()));
    }

    #[test]
    fn test_non_positive_rate_is_configuration_error() {
        let err = ArrivalProcess::new(RequestRate::Finite(0.0)).unwrap_err();
        assert!(matches!(err, RouterError::Configuration(_)));
    }
}
