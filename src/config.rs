//! Runtime configuration.
//!
//! A [`Config`] describes blocksizes, thread layout and checking policy. A
//! [`Context`] is built from it once: it owns the default control trees, the
//! micro-kernels and the worker pool, and is passed by reference into every
//! operation.

use std::env;
use std::num::NonZeroUsize;

use strided_blis_traits::{KernelSet, Kernels, Scalar};

use crate::blksz::Blocksizes;
use crate::cntl::ControlTrees;
use crate::thread::Workers;
use crate::{BlisError, Result};

/// Ways of parallelism per loop.
///
/// - `jc`: the NC loop over columns of C
/// - `pc`: the KC loop; must be 1, since k blocks update the same C
/// - `ic`: the MC loop over rows of C
/// - `jr`, `ir`: the NR and MR loops of the macro-kernel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThreadLayout {
    pub jc: usize,
    pub pc: usize,
    pub ic: usize,
    pub jr: usize,
    pub ir: usize,
}

impl ThreadLayout {
    pub const fn single() -> Self {
        Self {
            jc: 1,
            pc: 1,
            ic: 1,
            jr: 1,
            ir: 1,
        }
    }

    /// Total number of threads.
    pub fn total(&self) -> usize {
        self.jc * self.pc * self.ic * self.jr * self.ir
    }

    /// Ways in loop order, outermost first.
    pub fn ways(&self) -> [usize; 5] {
        [self.jc, self.pc, self.ic, self.jr, self.ir]
    }

    fn validate(&self) -> Result<()> {
        if self.ways().contains(&0) {
            return Err(BlisError::InvalidConfig(format!(
                "every loop needs at least one way, got {self:?}"
            )));
        }
        if self.pc != 1 {
            return Err(BlisError::InvalidConfig(format!(
                "the k loop cannot be split (pc={})",
                self.pc
            )));
        }
        Ok(())
    }
}

impl Default for ThreadLayout {
    fn default() -> Self {
        Self::single()
    }
}

/// Engine configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub blocksizes: Blocksizes,
    pub threads: ThreadLayout,
    /// Check operand structure before execution. Conformance checks that
    /// guard memory safety and control-tree validation always run.
    pub error_checking: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            blocksizes: Blocksizes::default(),
            threads: ThreadLayout::single(),
            error_checking: true,
        }
    }
}

impl Config {
    pub fn with_threads(mut self, jc: usize, ic: usize, jr: usize, ir: usize) -> Self {
        self.threads = ThreadLayout {
            jc,
            pc: 1,
            ic,
            jr,
            ir,
        };
        self
    }

    pub fn with_blocksizes(mut self, blocksizes: Blocksizes) -> Self {
        self.blocksizes = blocksizes;
        self
    }

    pub fn with_error_checking(mut self, on: bool) -> Self {
        self.error_checking = on;
        self
    }

    /// Default configuration overlaid with the thread counts found in the
    /// environment:
    ///
    /// - `STRIDED_BLIS_JC_NT`, `STRIDED_BLIS_IC_NT`, `STRIDED_BLIS_JR_NT`,
    ///   `STRIDED_BLIS_IR_NT`: ways of the respective loop
    /// - `STRIDED_BLIS_NUM_THREADS`: shorthand for the `ic` loop, used when
    ///   `STRIDED_BLIS_IC_NT` is unset
    pub fn from_env() -> Result<Self> {
        let mut cfg = Self::default();
        let t = &mut cfg.threads;
        if let Some(n) = read_ways("STRIDED_BLIS_NUM_THREADS")? {
            t.ic = n;
        }
        for (var, slot) in [
            ("STRIDED_BLIS_JC_NT", &mut t.jc),
            ("STRIDED_BLIS_IC_NT", &mut t.ic),
            ("STRIDED_BLIS_JR_NT", &mut t.jr),
            ("STRIDED_BLIS_IR_NT", &mut t.ir),
        ] {
            if let Some(n) = read_ways(var)? {
                *slot = n;
            }
        }
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        self.blocksizes.validate()?;
        self.threads.validate()
    }
}

fn read_ways(var: &str) -> Result<Option<usize>> {
    match env::var(var) {
        Ok(v) => match v.trim().parse::<NonZeroUsize>() {
            Ok(n) => Ok(Some(n.get())),
            Err(_) => Err(BlisError::InvalidConfig(format!("invalid value of {var}: {v:?}"))),
        },
        Err(env::VarError::NotUnicode(_)) => {
            Err(BlisError::InvalidConfig(format!("invalid value of {var}")))
        }
        Err(env::VarError::NotPresent) => Ok(None),
    }
}

/// Everything an operation needs besides its operands.
#[derive(Debug)]
pub struct Context {
    config: Config,
    trees: ControlTrees,
    kernels: KernelSet,
    workers: Workers,
}

impl Context {
    /// Validate `config`, build the control trees and spawn the workers.
    pub fn new(mut config: Config) -> Result<Self> {
        config.validate()?;
        if !cfg!(feature = "parallel") && config.threads.total() > 1 {
            tracing::warn!(
                layout = ?config.threads,
                "built without the `parallel` feature; running single-threaded"
            );
            config.threads = ThreadLayout::single();
        }
        let trees = ControlTrees::new(&config.blocksizes);
        let workers = Workers::new(config.threads.total())?;
        tracing::debug!(
            layout = ?config.threads,
            threads = workers.n_threads(),
            error_checking = config.error_checking,
            "created context"
        );
        Ok(Self {
            config,
            trees,
            kernels: KernelSet::reference(),
            workers,
        })
    }

    /// Replace the micro-kernels.
    pub fn with_kernels(mut self, kernels: KernelSet) -> Self {
        self.kernels = kernels;
        self
    }

    #[inline]
    pub fn config(&self) -> &Config {
        &self.config
    }

    #[inline]
    pub fn trees(&self) -> &ControlTrees {
        &self.trees
    }

    #[inline]
    pub fn kernels<T: Scalar>(&self) -> &Kernels<T> {
        self.kernels.get::<T>()
    }

    #[inline]
    pub fn n_threads(&self) -> usize {
        self.workers.n_threads()
    }

    #[inline]
    pub(crate) fn workers(&self) -> &Workers {
        &self.workers
    }

    /// Tear the context down, releasing the trees and joining the workers.
    pub fn finalize(self) {
        let Self { trees, workers, .. } = self;
        trees.free();
        drop(workers);
        tracing::debug!("context finalized");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_single_threaded() {
        let cfg = Config::default();
        assert_eq!(cfg.threads.total(), 1);
        assert!(cfg.error_checking);
        cfg.validate().unwrap();
    }

    #[test]
    fn test_with_threads() {
        let cfg = Config::default().with_threads(2, 3, 1, 1);
        assert_eq!(cfg.threads.ways(), [2, 1, 3, 1, 1]);
        assert_eq!(cfg.threads.total(), 6);
    }

    #[test]
    fn test_split_k_rejected() {
        let mut cfg = Config::default();
        cfg.threads.pc = 2;
        assert!(matches!(cfg.validate(), Err(BlisError::InvalidConfig(_))));
    }

    #[test]
    fn test_zero_ways_rejected() {
        let cfg = Config::default().with_threads(1, 0, 1, 1);
        assert!(Context::new(cfg).is_err());
    }

    #[test]
    fn test_read_ways_missing_variable() {
        assert_eq!(read_ways("STRIDED_BLIS_TEST_UNSET_VARIABLE").unwrap(), None);
    }

    #[test]
    fn test_context_lifecycle() {
        let ctx = Context::new(Config::default()).unwrap();
        assert_eq!(ctx.n_threads(), 1);
        assert!(ctx.trees().gemm().depth() > 1);
        ctx.finalize();
    }
}
