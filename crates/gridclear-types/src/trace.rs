use serde::{Deserialize, Serialize};

/// Per-iteration trajectories of one consensus run.
///
/// Price and quantity are indexed `[slot][agent][iteration]`, mismatch
/// `[slot][iteration]` and message arrival times `[agent][iteration]`.
/// Agent 0 is always the local agent; peers follow in peer-list order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IterationTrace {
    horizon: usize,
    agents: usize,
    capacity: usize,
    price: Vec<f64>,
    quantity: Vec<f64>,
    mismatch: Vec<f64>,
    delay_price: Vec<f64>,
    delay_quantity: Vec<f64>,
}

impl IterationTrace {
    /// Allocate a zeroed trace for `horizon` slots, `agents` agents and
    /// `capacity` iterations.
    pub fn new(horizon: usize, agents: usize, capacity: usize) -> Self {
        IterationTrace {
            horizon,
            agents,
            capacity,
            price: vec![0.0; horizon * agents * capacity],
            quantity: vec![0.0; horizon * agents * capacity],
            mismatch: vec![0.0; horizon * capacity],
            delay_price: vec![0.0; agents * capacity],
            delay_quantity: vec![0.0; agents * capacity],
        }
    }

    pub fn horizon(&self) -> usize {
        self.horizon
    }

    pub fn agents(&self) -> usize {
        self.agents
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn at(&self, slot: usize, agent: usize, iter: usize) -> usize {
        debug_assert!(slot < self.horizon && agent < self.agents && iter < self.capacity);
        (slot * self.agents + agent) * self.capacity + iter
    }

    pub fn price(&self, slot: usize, agent: usize, iter: usize) -> f64 {
        self.price[self.at(slot, agent, iter)]
    }

    pub fn set_price(&mut self, slot: usize, agent: usize, iter: usize, value: f64) {
        let i = self.at(slot, agent, iter);
        self.price[i] = value;
    }

    pub fn quantity(&self, slot: usize, agent: usize, iter: usize) -> f64 {
        self.quantity[self.at(slot, agent, iter)]
    }

    pub fn set_quantity(&mut self, slot: usize, agent: usize, iter: usize, value: f64) {
        let i = self.at(slot, agent, iter);
        self.quantity[i] = value;
    }

    pub fn mismatch(&self, slot: usize, iter: usize) -> f64 {
        self.mismatch[slot * self.capacity + iter]
    }

    pub fn set_mismatch(&mut self, slot: usize, iter: usize, value: f64) {
        self.mismatch[slot * self.capacity + iter] = value;
    }

    pub fn set_delay_price(&mut self, agent: usize, iter: usize, at: f64) {
        self.delay_price[agent * self.capacity + iter] = at;
    }

    pub fn set_delay_quantity(&mut self, agent: usize, iter: usize, at: f64) {
        self.delay_quantity[agent * self.capacity + iter] = at;
    }

    /// Prices of `agent` for every slot at `iter`
    pub fn price_column(&self, agent: usize, iter: usize) -> Vec<f64> {
        (0..self.horizon).map(|s| self.price(s, agent, iter)).collect()
    }

    /// Quantities of `agent` for every slot at `iter`
    pub fn quantity_column(&self, agent: usize, iter: usize) -> Vec<f64> {
        (0..self.horizon).map(|s| self.quantity(s, agent, iter)).collect()
    }

    /// Sum of all agents' quantities for `slot` at `iter`
    pub fn total_quantity(&self, slot: usize, iter: usize) -> f64 {
        (0..self.agents).map(|a| self.quantity(slot, a, iter)).sum()
    }

    /// Largest absolute mismatch over all slots at `iter`
    pub fn max_abs_mismatch(&self, iter: usize) -> f64 {
        (0..self.horizon)
            .map(|s| self.mismatch(s, iter).abs())
            .fold(0.0, f64::max)
    }

    /// Price values of `agent`, one row per slot, iterations `0..columns`
    pub fn price_rows(&self, agent: usize, columns: usize) -> Vec<Vec<f64>> {
        let columns = columns.min(self.capacity);
        (0..self.horizon)
            .map(|s| (0..columns).map(|k| self.price(s, agent, k)).collect())
            .collect()
    }

    /// Quantity values of `agent`, one row per slot, iterations `0..columns`
    pub fn quantity_rows(&self, agent: usize, columns: usize) -> Vec<Vec<f64>> {
        let columns = columns.min(self.capacity);
        (0..self.horizon)
            .map(|s| (0..columns).map(|k| self.quantity(s, agent, k)).collect())
            .collect()
    }

    /// Price-message arrival times, one row per agent
    pub fn delay_price_rows(&self, columns: usize) -> Vec<Vec<f64>> {
        rows(&self.delay_price, self.agents, self.capacity, columns)
    }

    /// Quantity-message arrival times, one row per agent
    pub fn delay_quantity_rows(&self, columns: usize) -> Vec<Vec<f64>> {
        rows(&self.delay_quantity, self.agents, self.capacity, columns)
    }
}

fn rows(data: &[f64], n_rows: usize, stride: usize, columns: usize) -> Vec<Vec<f64>> {
    let columns = columns.min(stride);
    (0..n_rows)
        .map(|r| data[r * stride..r * stride + columns].to_vec())
        .collect()
}
