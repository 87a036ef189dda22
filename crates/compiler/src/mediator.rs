//! The compilation mediator
//!
//! A [`Mediator`] names the embedding tool; a [`Lifetime`] owns everything a
//! single compilation needs: the shared [`TreeContext`], the extension
//! registry, and one [`Context`] per translation unit. The lifetime drives
//! every driver through the fixed stage order, then resolves all forward
//! declarations, then hands the finished modules to the SSA lowerer.
//!
//! Iteration anywhere in the lifetime is deterministic for a given input
//! set: contexts and modules are visited in canonical-path order and tag
//! maps in name order.

use crate::driver::{Context, Driver, Stage, VersionInfo, dispatch_stage};
use crate::errors;
use crate::sema::{self, Tag};
use crate::tree::{TreeContext, TreeId};
use cthulhu_core::reports::{Reports, Severity};
use cthulhu_core::scan::ScanRef;
use std::collections::{BTreeMap, HashMap};
use std::rc::Rc;
use tracing::debug;

/// Identity of the embedding tool
#[derive(Debug, Clone)]
pub struct Mediator {
    pub id: String,
    pub version: VersionInfo,
}

impl Mediator {
    pub fn new(id: impl Into<String>, version: VersionInfo) -> Self {
        Mediator {
            id: id.into(),
            version,
        }
    }
}

/// State of one compilation
pub struct Lifetime {
    mediator: Mediator,
    pub tcx: TreeContext,
    extensions: HashMap<String, Rc<dyn Driver>>,
    contexts: Vec<Context>,
    paths: HashMap<String, usize>,
}

impl Lifetime {
    pub fn new(mediator: Mediator) -> Self {
        Lifetime {
            mediator,
            tcx: TreeContext::new(Reports::new()),
            extensions: HashMap::new(),
            contexts: Vec::new(),
            paths: HashMap::new(),
        }
    }

    pub fn mediator(&self) -> &Mediator {
        &self.mediator
    }

    pub fn reports(&self) -> Rc<Reports> {
        self.tcx.reports.clone()
    }

    /// Register a driver under every extension it claims, then run its
    /// `create` hook. A clashing extension keeps the first registration and
    /// warns.
    pub fn add_language(&mut self, driver: Rc<dyn Driver>) {
        for ext in driver.extensions() {
            if let Some(old) = self.extensions.get(*ext) {
                self.tcx.reports.report(
                    Severity::Warning,
                    None,
                    format!(
                        "language `{}` claims extension `{}` already owned by `{}`",
                        driver.id(),
                        ext,
                        old.id()
                    ),
                );
                continue;
            }
            self.extensions.insert(ext.to_string(), driver.clone());
        }
        debug!(driver = driver.id(), version = %driver.version(), "registered language");
        driver.create(self);
    }

    pub fn language_for(&self, ext: &str) -> Option<Rc<dyn Driver>> {
        self.extensions.get(ext).cloned()
    }

    /// Parse one source through a driver. The driver registers whatever
    /// contexts it produces via [`Lifetime::add_context`].
    pub fn parse(&mut self, driver: Rc<dyn Driver>, scan: ScanRef) {
        debug!(driver = driver.id(), path = %scan.path().display(), "parsing");
        driver.parse(self, scan);
    }

    /// Register a translation unit under its canonical path
    pub fn add_context(&mut self, ctx: Context) {
        let canonical = ctx.canonical_path();
        if let Some(&existing) = self.paths.get(&canonical) {
            let previous = self.contexts[existing].root;
            let span = self.tcx.span_of(previous);
            let here = self.tcx.span_of(ctx.root);
            errors::report_redefinition(&self.tcx.reports, &canonical, here, span);
            return;
        }
        debug!(path = %canonical, "added context");
        self.paths.insert(canonical, self.contexts.len());
        self.contexts.push(ctx);
    }

    pub fn context_at(&self, path: &str) -> Option<&Context> {
        self.paths.get(path).map(|&i| &self.contexts[i])
    }

    /// Indices of all contexts in canonical-path order
    fn context_order(&self) -> Vec<usize> {
        let mut order: Vec<(String, usize)> = self
            .paths
            .iter()
            .map(|(path, &index)| (path.clone(), index))
            .collect();
        order.sort();
        order.into_iter().map(|(_, index)| index).collect()
    }

    /// Run one stage across every context
    pub fn run_stage(&mut self, stage: Stage) {
        debug!(stage = %stage, "running stage");
        for index in self.context_order() {
            let tcx = &mut self.tcx;
            let ctx = &mut self.contexts[index];
            let driver = ctx.driver.clone();
            dispatch_stage(driver.as_ref(), stage, tcx, ctx);
        }
    }

    /// Resolve every forward declaration in every module
    ///
    /// Modules are visited in canonical-path order, tags in the fixed
    /// `Values`, `Types`, `Procs` order, names sorted within a tag, and
    /// submodules depth-first afterwards.
    pub fn resolve(&mut self) {
        debug!("resolving forward declarations");
        let roots: Vec<TreeId> = self
            .context_order()
            .into_iter()
            .map(|index| self.contexts[index].root)
            .collect();
        for root in roots {
            resolve_module(&mut self.tcx, root);
        }
    }

    /// Finished modules, keyed by canonical path
    pub fn collect_modules(&self) -> BTreeMap<String, TreeId> {
        self.paths
            .iter()
            .map(|(path, &index)| (path.clone(), self.contexts[index].root))
            .collect()
    }

    /// Lower every module into one flat SSA symbol map
    ///
    /// In debug builds the result is verified and any finding is an internal
    /// diagnostic.
    pub fn lower(&self) -> crate::ssa::SsaModule {
        let modules = self.collect_modules();
        let lowered = crate::ssa::lower::lower(&self.tcx, &modules);
        if cfg!(debug_assertions)
            && let Err(findings) = crate::ssa::verify::verify(&lowered)
        {
            for finding in findings {
                self.tcx
                    .reports
                    .report(Severity::Internal, None, finding.to_string());
            }
        }
        lowered
    }
}

fn resolve_module(tcx: &mut TreeContext, module: TreeId) {
    for tag in [Tag::Values, Tag::Types, Tag::Procs] {
        for (_, decl) in tcx.module_tag(module, tag) {
            sema::resolve(tcx, decl);
        }
    }
    for (_, submodule) in tcx.module_tag(module, Tag::Modules) {
        resolve_module(tcx, submodule);
    }
}
