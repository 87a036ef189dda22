//! Cthulhu compiler library
//!
//! The shared middle end of the Cthulhu compiler collection. Language
//! front-ends implement the [`driver::Driver`] contract and lower their
//! sources into the typed [`tree`] IR; the [`mediator::Lifetime`] runs every
//! driver through a fixed stage order, resolves forward declarations through
//! the cookie, and [`ssa`] lowering turns the finished modules into the
//! block-based form backends consume.
//!
//! The pipeline, end to end:
//!
//! 1. register drivers ([`mediator::Lifetime::add_language`])
//! 2. parse sources ([`mediator::Lifetime::parse`])
//! 3. run the four compile stages in order ([`run_pipeline`])
//! 4. resolve forward declarations
//! 5. lower to SSA ([`mediator::Lifetime::lower`]) and verify
//!
//! Phases are gated: any error-severity diagnostic stops the pipeline at the
//! next boundary and becomes the process exit code.

pub mod builder;
pub mod config;
pub mod driver;
pub mod dump;
pub mod errors;
pub mod example;
pub mod mediator;
pub mod ops;
pub mod sema;
pub mod ssa;
pub mod tree;
pub mod types;

pub use cthulhu_core::reports::{EXIT_ERROR, EXIT_INTERNAL, EXIT_INTERRUPT, EXIT_OK};

use driver::Stage;
use mediator::Lifetime;

/// Run the compile stages and resolution with phase gating
///
/// Stops at the first phase boundary with error diagnostics and returns the
/// exit code for the run so far; [`EXIT_OK`] means every phase completed.
pub fn run_pipeline(lifetime: &mut Lifetime) -> i32 {
    for stage in Stage::ALL {
        lifetime.run_stage(stage);
        let status = lifetime.reports().end(stage.name());
        if status != EXIT_OK {
            return status;
        }
    }

    lifetime.resolve();
    lifetime.reports().end("resolve")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::{Context, Driver, VersionInfo};
    use crate::example::ExampleDriver;
    use crate::mediator::Mediator;
    use crate::ssa::verify::verify;
    use crate::tree::TreeContext;
    use cthulhu_core::scan::{Scan, ScanRef};
    use std::rc::Rc;

    fn lifetime() -> Lifetime {
        Lifetime::new(Mediator::new("ctc", VersionInfo::new(0, 1, 0)))
    }

    #[test]
    fn test_pipeline_runs_clean_source() {
        let mut lifetime = lifetime();
        let driver: Rc<dyn Driver> = Rc::new(ExampleDriver);
        lifetime.add_language(driver.clone());
        lifetime.parse(driver, Scan::new("example", "clean.e", "x = 1\ny = x + 2\n"));

        assert_eq!(run_pipeline(&mut lifetime), EXIT_OK);
        let ssa = lifetime.lower();
        assert!(ssa.contains_key("clean.x"));
        assert!(ssa.contains_key("clean.y"));
        assert!(verify(&ssa).is_ok());
    }

    #[test]
    fn test_pipeline_gates_on_errors() {
        struct FailingDriver;

        impl Driver for FailingDriver {
            fn id(&self) -> &str {
                "failing"
            }

            fn display_name(&self) -> &str {
                "Failing"
            }

            fn version(&self) -> VersionInfo {
                VersionInfo::new(0, 0, 1)
            }

            fn extensions(&self) -> &[&str] {
                &["fail"]
            }

            fn parse(&self, lifetime: &mut Lifetime, scan: ScanRef) {
                let root = lifetime
                    .tcx
                    .module_root(cthulhu_core::scan::Span::builtin(), "broken", 0);
                let path = vec!["broken".to_string()];
                let mut ctx = Context::new(lifetime.language_for("fail").unwrap(), path, root);
                ctx.scan = Some(scan);
                lifetime.add_context(ctx);
            }

            fn forward_symbols(&self, tcx: &mut TreeContext, ctx: &mut Context) {
                let span = tcx.span_of(ctx.root);
                crate::errors::report(
                    &tcx.reports,
                    crate::errors::ErrorKind::TypeMismatch,
                    span,
                    "nothing makes sense",
                );
            }

            fn compile_types(&self, _tcx: &mut TreeContext, _ctx: &mut Context) {
                panic!("a later stage ran after a failing phase boundary");
            }
        }

        let mut lifetime = lifetime();
        let driver: Rc<dyn Driver> = Rc::new(FailingDriver);
        lifetime.add_language(driver.clone());
        lifetime.parse(driver, Scan::new("failing", "broken.fail", ""));

        assert_eq!(run_pipeline(&mut lifetime), EXIT_ERROR);
    }

    #[test]
    fn test_cycle_exit_code() {
        let mut lifetime = lifetime();
        let driver: Rc<dyn Driver> = Rc::new(ExampleDriver);
        lifetime.add_language(driver.clone());
        lifetime.parse(driver, Scan::new("example", "spin.e", "a = b\nb = a\n"));

        assert_eq!(run_pipeline(&mut lifetime), EXIT_ERROR);
        assert!(lifetime.lower().is_empty());
    }

    #[test]
    fn test_lowered_output_passes_verification() {
        let mut lifetime = lifetime();
        let driver: Rc<dyn Driver> = Rc::new(ExampleDriver);
        lifetime.add_language(driver.clone());
        lifetime.parse(
            driver,
            Scan::new(
                "example",
                "verified.e",
                "base = 3\nstep = base * base + 1\nfinal = step - base\n",
            ),
        );

        assert_eq!(run_pipeline(&mut lifetime), EXIT_OK);
        let ssa = lifetime.lower();
        assert_eq!(ssa.len(), 3);
        assert!(verify(&ssa).is_ok());

        let rendered = crate::ssa::emit::render(&ssa);
        assert!(rendered.contains("global verified.base: int = $3"));
        assert!(rendered.contains("def verified.step"));
    }
}
