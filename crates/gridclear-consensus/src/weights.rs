use nalgebra::DMatrix;

/// Row-normalized absolute Laplacian of a star graph.
///
/// Agent 0 is the hub and weights every peer equally; each peer weights only
/// itself and the hub.
#[derive(Debug, Clone, PartialEq)]
pub struct LaplacianWeights {
    d: DMatrix<f64>,
}

impl LaplacianWeights {
    /// Build the weights for `n` agents (hub plus `n - 1` peers)
    pub fn build(n: usize) -> Self {
        let mut laplacian = DMatrix::<f64>::zeros(n, n);
        for i in 1..n {
            laplacian[(i, i)] = 1.0;
            laplacian[(0, i)] = -1.0;
            laplacian[(i, 0)] = -1.0;
        }
        if n > 0 {
            laplacian[(0, 0)] = -((n - 1) as f64);
        }

        let abs = laplacian.abs();
        let mut d = DMatrix::<f64>::zeros(n, n);
        for i in 0..n {
            let sum = abs.row(i).sum();
            if sum > 0.0 {
                for j in 0..n {
                    d[(i, j)] = abs[(i, j)] / sum;
                }
            } else {
                // a hub without peers keeps its own estimate
                d[(i, i)] = 1.0;
            }
        }

        LaplacianWeights { d }
    }

    pub fn n(&self) -> usize {
        self.d.nrows()
    }

    pub fn weight(&self, i: usize, j: usize) -> f64 {
        self.d[(i, j)]
    }

    pub fn row(&self, i: usize) -> Vec<f64> {
        self.d.row(i).iter().copied().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_two_agents_split_evenly() {
        let w = LaplacianWeights::build(2);
        assert_eq!(w.n(), 2);
        assert_eq!(w.weight(0, 1), 0.5);
        assert_eq!(w.weight(1, 0), 0.5);
        assert_eq!(w.row(0).iter().sum::<f64>(), 1.0);
        assert_eq!(w.row(1).iter().sum::<f64>(), 1.0);
    }

    #[test]
    fn test_star_rows() {
        let w = LaplacianWeights::build(4);

        // hub: |-(n-1)| on the diagonal, 1 per peer
        assert!((w.weight(0, 0) - 0.5).abs() < 1e-12);
        for j in 1..4 {
            assert!((w.weight(0, j) - 1.0 / 6.0).abs() < 1e-12);
        }
        // peers see only themselves and the hub
        assert_eq!(w.row(2), vec![0.5, 0.0, 0.5, 0.0]);
    }

    #[test]
    fn test_lone_hub_keeps_own_price() {
        let w = LaplacianWeights::build(1);
        assert_eq!(w.row(0), vec![1.0]);
    }
}
