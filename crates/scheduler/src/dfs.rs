//! Simulated distributed filesystem: a synthetic block-placement oracle the
//! Quincy cost model queries for per-task input file sets and replica
//! locations. No bytes exist anywhere; only block counts and placements.

use std::collections::{HashMap, HashSet};

use rand::rngs::StdRng;
use rand::seq::IndexedRandom;
use rand::{Rng, SeedableRng};
use tracing::debug;

use flowgrid_core::types::ResourceId;

use crate::distributions::BlockDistribution;

pub type FileId = u64;

/// Synthetic files created when a machine joins.
const FILES_PER_MACHINE: usize = 64;
/// Replica count per file, capped by the number of known machines.
const REPLICATION_FACTOR: usize = 3;

pub struct SimulatedDfs {
    /// Block count per file; the index is the file id.
    file_blocks: Vec<u64>,
    replicas: HashMap<ResourceId, HashSet<FileId>>,
    block_dist: BlockDistribution,
    rng: StdRng,
}

impl SimulatedDfs {
    pub fn new(seed: u64) -> Self {
        Self {
            file_blocks: Vec::new(),
            replicas: HashMap::new(),
            block_dist: BlockDistribution::google(),
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn num_files(&self) -> usize {
        self.file_blocks.len()
    }

    pub fn num_machines(&self) -> usize {
        self.replicas.len()
    }

    pub fn blocks_for_file(&self, file: FileId) -> Option<u64> {
        self.file_blocks.get(file as usize).copied()
    }

    /// A machine joined: mint synthetic files on it and spread extra
    /// replicas over the machines already present.
    pub fn add_machine(&mut self, machine: ResourceId) {
        let peers: Vec<ResourceId> = self.replicas.keys().copied().collect();
        let mut minted = Vec::with_capacity(FILES_PER_MACHINE);

        for _ in 0..FILES_PER_MACHINE {
            let p: f64 = self.rng.random();
            let id = self.file_blocks.len() as FileId;
            self.file_blocks.push(self.block_dist.inverse(p));
            minted.push(id);
        }

        self.replicas
            .entry(machine)
            .or_default()
            .extend(minted.iter().copied());

        for &file in &minted {
            let extra = peers.choose_multiple(&mut self.rng, REPLICATION_FACTOR - 1);
            for peer in extra {
                if let Some(set) = self.replicas.get_mut(peer) {
                    set.insert(file);
                }
            }
        }

        debug!(
            "DFS: machine {} added, {} files total across {} machines",
            machine,
            self.file_blocks.len(),
            self.replicas.len()
        );
    }

    /// A machine left: its replicas disappear, the files persist on peers.
    pub fn remove_machine(&mut self, machine: ResourceId) {
        self.replicas.remove(&machine);
        debug!("DFS: machine {} removed", machine);
    }

    /// Sample a file set whose total block count lands within
    /// `percent_tolerance`% of `num_blocks`. Uniform draws without
    /// replacement; files that would overshoot are skipped. Returns the
    /// best-effort set once the draw budget is exhausted.
    pub fn sample_files(&mut self, num_blocks: u64, percent_tolerance: u32) -> HashSet<FileId> {
        let mut sampled = HashSet::new();
        if self.file_blocks.is_empty() {
            return sampled;
        }

        let tolerance = percent_tolerance.min(100) as u64;
        let min_blocks = num_blocks.saturating_mul(100 - tolerance) / 100;
        let max_blocks = (num_blocks.saturating_mul(100 + tolerance) / 100).max(1);

        let mut total = 0u64;
        let mut draws = 0usize;
        let budget = self.file_blocks.len().saturating_mul(4);

        while total < min_blocks && draws < budget {
            draws += 1;
            let file = self.rng.random_range(0..self.file_blocks.len()) as FileId;
            if sampled.contains(&file) {
                continue;
            }
            let blocks = self.file_blocks[file as usize];
            if total + blocks > max_blocks {
                continue;
            }
            sampled.insert(file);
            total += blocks;
        }

        debug!(
            "DFS: sampled {} files ({} blocks) for target {} +/- {}%",
            sampled.len(),
            total,
            num_blocks,
            percent_tolerance
        );
        sampled
    }

    /// Replica locations of a file.
    pub fn machines_for_file(&self, file: FileId) -> Vec<ResourceId> {
        self.replicas
            .iter()
            .filter(|(_, files)| files.contains(&file))
            .map(|(machine, _)| *machine)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn add_machine_mints_files() {
        let mut dfs = SimulatedDfs::new(7);
        assert_eq!(dfs.num_files(), 0);

        dfs.add_machine(Uuid::new_v4());
        assert_eq!(dfs.num_files(), FILES_PER_MACHINE);
        assert_eq!(dfs.num_machines(), 1);

        dfs.add_machine(Uuid::new_v4());
        assert_eq!(dfs.num_files(), 2 * FILES_PER_MACHINE);
    }

    #[test]
    fn files_survive_machine_removal() {
        let mut dfs = SimulatedDfs::new(7);
        let m1 = Uuid::new_v4();
        let m2 = Uuid::new_v4();
        dfs.add_machine(m1);
        dfs.add_machine(m2);

        dfs.remove_machine(m1);
        assert_eq!(dfs.num_machines(), 1);
        assert_eq!(dfs.num_files(), 2 * FILES_PER_MACHINE);
        assert!(!dfs.machines_for_file(0).contains(&m1));
    }

    #[test]
    fn sample_respects_tolerance_band() {
        let mut dfs = SimulatedDfs::new(42);
        for _ in 0..4 {
            dfs.add_machine(Uuid::new_v4());
        }

        let target = 1_000u64;
        let set = dfs.sample_files(target, 50);
        let total: u64 = set
            .iter()
            .map(|f| dfs.blocks_for_file(*f).unwrap())
            .sum();
        // Upper bound is hard; the lower bound is best-effort under the
        // draw budget, so only the overshoot side is strict.
        assert!(total <= target * 150 / 100, "total={total}");
        assert!(!set.is_empty());
    }

    #[test]
    fn sample_from_empty_dfs_is_empty() {
        let mut dfs = SimulatedDfs::new(1);
        assert!(dfs.sample_files(100, 50).is_empty());
    }

    #[test]
    fn sampling_is_reproducible_under_a_seed() {
        let machines: Vec<ResourceId> = (0..3).map(|_| Uuid::new_v4()).collect();

        let mut a = SimulatedDfs::new(99);
        let mut b = SimulatedDfs::new(99);
        for m in &machines {
            a.add_machine(*m);
            b.add_machine(*m);
        }

        assert_eq!(a.sample_files(500, 50), b.sample_files(500, 50));
    }
}
