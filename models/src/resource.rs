use serde::{Deserialize, Serialize};
use std::ops::{Add, Sub};

/// Five named integer scalars in their canonical smallest unit: cpu in
/// millicores, memory in bytes, gpu as a count, io and net in bytes/s.
/// All arithmetic on this type is plain integer arithmetic -- there is no
/// floating-point accumulation anywhere on the resource-accounting path.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceVector {
    pub cpu: i64,
    pub memory: i64,
    pub gpu: i64,
    pub io: i64,
    pub net: i64,
}

impl ResourceVector {
    pub const ZERO: ResourceVector = ResourceVector {
        cpu: 0,
        memory: 0,
        gpu: 0,
        io: 0,
        net: 0,
    };

    pub fn new(cpu: i64, memory: i64, gpu: i64, io: i64, net: i64) -> Self {
        Self {
            cpu,
            memory,
            gpu,
            io,
            net,
        }
    }

    /// True iff `self` dominates `requested` component-wise, i.e. `self` has
    /// at least as much free capacity as `requested` asks for in every
    /// resource.
    pub fn dominates(&self, requested: &ResourceVector) -> bool {
        self.cpu >= requested.cpu
            && self.memory >= requested.memory
            && self.gpu >= requested.gpu
            && self.io >= requested.io
            && self.net >= requested.net
    }

    /// Utilization ratio for one resource, 0.0 if the column's total is 0.
    pub fn utilization(total: i64, allocated: i64) -> f64 {
        if total <= 0 {
            0.0
        } else {
            allocated as f64 / total as f64
        }
    }
}

impl Add for ResourceVector {
    type Output = ResourceVector;

    fn add(self, rhs: Self) -> Self::Output {
        ResourceVector {
            cpu: self.cpu + rhs.cpu,
            memory: self.memory + rhs.memory,
            gpu: self.gpu + rhs.gpu,
            io: self.io + rhs.io,
            net: self.net + rhs.net,
        }
    }
}

impl Sub for ResourceVector {
    type Output = ResourceVector;

    fn sub(self, rhs: Self) -> Self::Output {
        ResourceVector {
            cpu: self.cpu - rhs.cpu,
            memory: self.memory - rhs.memory,
            gpu: self.gpu - rhs.gpu,
            io: self.io - rhs.io,
            net: self.net - rhs.net,
        }
    }
}

impl std::iter::Sum for ResourceVector {
    fn sum<I: Iterator<Item = ResourceVector>>(iter: I) -> Self {
        iter.fold(ResourceVector::ZERO, Add::add)
    }
}
