//! Structural checks over lowered SSA
//!
//! The verifier enforces the contract backends rely on: every block ends in
//! exactly one terminator, control transfers stay inside the symbol, and
//! every register operand refers to a value-producing step that dominates
//! its use. Lowering runs it in debug builds; the test harness runs it
//! unconditionally.

use crate::ssa::{BlockId, SsaModule, SsaOperand, SsaSymbol};
use std::collections::HashSet;
use std::fmt;

/// One verifier finding
#[derive(Debug, Clone)]
pub struct VerifyError {
    pub symbol: String,
    pub block: String,
    pub message: String,
}

impl fmt::Display for VerifyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.block.is_empty() {
            write!(f, "{}: {}", self.symbol, self.message)
        } else {
            write!(f, "{}.{}: {}", self.symbol, self.block, self.message)
        }
    }
}

/// Check every symbol of a lowered module
pub fn verify(module: &SsaModule) -> Result<(), Vec<VerifyError>> {
    let mut errors = Vec::new();
    for symbol in module.values() {
        verify_symbol(symbol, &mut errors);
    }
    if errors.is_empty() { Ok(()) } else { Err(errors) }
}

fn verify_symbol(symbol: &SsaSymbol, errors: &mut Vec<VerifyError>) {
    let blocks = symbol.blocks.len();

    let Some(entry) = symbol.entry else {
        if blocks != 0 {
            errors.push(error(symbol, "", "symbol has blocks but no entry"));
        }
        return;
    };
    if entry.0 as usize >= blocks {
        errors.push(error(symbol, "", "entry is not a block of this symbol"));
        return;
    }

    // block shape: one terminator, at the end
    for block in &symbol.blocks {
        match block.steps.last() {
            None => errors.push(error(symbol, &block.name, "block is empty")),
            Some(last) if !last.op.is_terminator() => {
                errors.push(error(symbol, &block.name, "block does not end in a terminator"));
            }
            Some(_) => {}
        }
        for step in block.steps.iter().take(block.steps.len().saturating_sub(1)) {
            if step.op.is_terminator() {
                errors.push(error(
                    symbol,
                    &block.name,
                    format!("terminator `{}` is not the last step", step.op.name()),
                ));
            }
        }
        for step in &block.steps {
            for target in step.op.successors() {
                if target.0 as usize >= blocks {
                    errors.push(error(
                        symbol,
                        &block.name,
                        format!("control transfer to missing block {}", target.0),
                    ));
                }
            }
            for operand in step.op.operands() {
                if let SsaOperand::Block(target) = operand
                    && target.0 as usize >= blocks
                {
                    errors.push(error(
                        symbol,
                        &block.name,
                        format!("operand references missing block {}", target.0),
                    ));
                }
            }
        }
    }

    // register dominance
    let dom = dominators(symbol, entry);
    for (b, block) in symbol.blocks.iter().enumerate() {
        for (i, step) in block.steps.iter().enumerate() {
            for operand in step.op.operands() {
                let SsaOperand::Reg(reg) = operand else {
                    continue;
                };
                let db = reg.block.0 as usize;
                if db >= blocks {
                    errors.push(error(symbol, &block.name, "register from a missing block"));
                    continue;
                }
                let def_block = &symbol.blocks[db];
                if reg.index >= def_block.steps.len() {
                    errors.push(error(symbol, &block.name, "register from a missing step"));
                    continue;
                }
                if !def_block.steps[reg.index].op.produces_value() {
                    errors.push(error(
                        symbol,
                        &block.name,
                        format!(
                            "register refers to `{}`, which produces no value",
                            def_block.steps[reg.index].op.name()
                        ),
                    ));
                    continue;
                }
                if db == b {
                    if reg.index >= i {
                        errors.push(error(
                            symbol,
                            &block.name,
                            "register used before it is defined",
                        ));
                    }
                } else if !dom[b].contains(&db) {
                    errors.push(error(
                        symbol,
                        &block.name,
                        format!("register defined in `{}` does not dominate its use", def_block.name),
                    ));
                }
            }
        }
    }
}

/// Iterative dominator sets over branch/jump edges
///
/// Unreachable blocks keep the full set, which makes their register checks
/// vacuous; the termination checks still apply to them.
fn dominators(symbol: &SsaSymbol, entry: BlockId) -> Vec<HashSet<usize>> {
    let n = symbol.blocks.len();
    let mut preds: Vec<Vec<usize>> = vec![Vec::new(); n];
    for (b, block) in symbol.blocks.iter().enumerate() {
        for step in &block.steps {
            for succ in step.op.successors() {
                let s = succ.0 as usize;
                if s < n {
                    preds[s].push(b);
                }
            }
        }
    }

    let full: HashSet<usize> = (0..n).collect();
    let mut dom: Vec<HashSet<usize>> = vec![full; n];
    let entry = entry.0 as usize;
    dom[entry] = HashSet::from([entry]);

    let mut changed = true;
    while changed {
        changed = false;
        for b in 0..n {
            if b == entry {
                continue;
            }
            let mut next: Option<HashSet<usize>> = None;
            for &p in &preds[b] {
                next = Some(match next {
                    None => dom[p].clone(),
                    Some(acc) => acc.intersection(&dom[p]).copied().collect(),
                });
            }
            let mut next = next.unwrap_or_else(|| (0..n).collect());
            next.insert(b);
            if next != dom[b] {
                dom[b] = next;
                changed = true;
            }
        }
    }
    dom
}

fn error(symbol: &SsaSymbol, block: &str, message: impl Into<String>) -> VerifyError {
    VerifyError {
        symbol: symbol.name.clone(),
        block: block.to_string(),
        message: message.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ssa::{SsaBlock, SsaOp, SsaStep, SsaType, StepRef};

    fn symbol(blocks: Vec<SsaBlock>) -> SsaModule {
        let mut module = SsaModule::new();
        module.insert(
            "f".into(),
            SsaSymbol {
                name: "f".into(),
                ty: SsaType::Unit,
                value: None,
                entry: Some(BlockId(0)),
                blocks,
                locals: vec![],
                params: vec![],
            },
        );
        module
    }

    fn step(op: SsaOp) -> SsaStep {
        SsaStep {
            op,
            ty: SsaType::Unit,
        }
    }

    #[test]
    fn test_accepts_minimal_function() {
        let module = symbol(vec![SsaBlock {
            name: "entry".into(),
            steps: vec![step(SsaOp::Return {
                value: SsaOperand::Empty,
            })],
        }]);
        assert!(verify(&module).is_ok());
    }

    #[test]
    fn test_rejects_unterminated_block() {
        let module = symbol(vec![SsaBlock {
            name: "entry".into(),
            steps: vec![step(SsaOp::Load {
                src: SsaOperand::Local(0),
            })],
        }]);
        let errors = verify(&module).unwrap_err();
        assert!(errors.iter().any(|e| e.message.contains("terminator")));
    }

    #[test]
    fn test_rejects_mid_block_terminator() {
        let module = symbol(vec![SsaBlock {
            name: "entry".into(),
            steps: vec![
                step(SsaOp::Return {
                    value: SsaOperand::Empty,
                }),
                step(SsaOp::Return {
                    value: SsaOperand::Empty,
                }),
            ],
        }]);
        let errors = verify(&module).unwrap_err();
        assert!(errors.iter().any(|e| e.message.contains("not the last step")));
    }

    #[test]
    fn test_rejects_forward_register_use() {
        let module = symbol(vec![SsaBlock {
            name: "entry".into(),
            steps: vec![
                step(SsaOp::Unary {
                    op: crate::ops::UnaryOp::Neg,
                    operand: SsaOperand::Reg(StepRef {
                        block: BlockId(0),
                        index: 1,
                    }),
                }),
                step(SsaOp::Return {
                    value: SsaOperand::Empty,
                }),
            ],
        }]);
        let errors = verify(&module).unwrap_err();
        assert!(!errors.is_empty());
    }

    #[test]
    fn test_rejects_non_dominating_definition() {
        // entry branches to b1 and b2; b2 uses a register defined in b1
        let module = symbol(vec![
            SsaBlock {
                name: "entry".into(),
                steps: vec![step(SsaOp::Branch {
                    cond: SsaOperand::Empty,
                    then: BlockId(1),
                    other: BlockId(2),
                })],
            },
            SsaBlock {
                name: "b1".into(),
                steps: vec![
                    step(SsaOp::Load {
                        src: SsaOperand::Local(0),
                    }),
                    step(SsaOp::Return {
                        value: SsaOperand::Empty,
                    }),
                ],
            },
            SsaBlock {
                name: "b2".into(),
                steps: vec![step(SsaOp::Return {
                    value: SsaOperand::Reg(StepRef {
                        block: BlockId(1),
                        index: 0,
                    }),
                })],
            },
        ]);
        let errors = verify(&module).unwrap_err();
        assert!(errors.iter().any(|e| e.message.contains("dominate")));
    }

    #[test]
    fn test_accepts_dominating_definition() {
        // entry defines a register, then jumps; the successor uses it
        let module = symbol(vec![
            SsaBlock {
                name: "entry".into(),
                steps: vec![
                    step(SsaOp::Load {
                        src: SsaOperand::Local(0),
                    }),
                    step(SsaOp::Jump { target: BlockId(1) }),
                ],
            },
            SsaBlock {
                name: "next".into(),
                steps: vec![step(SsaOp::Return {
                    value: SsaOperand::Reg(StepRef {
                        block: BlockId(0),
                        index: 0,
                    }),
                })],
            },
        ]);
        assert!(verify(&module).is_ok());
    }

    #[test]
    fn test_rejects_register_from_storeless_step() {
        let module = symbol(vec![SsaBlock {
            name: "entry".into(),
            steps: vec![
                step(SsaOp::Store {
                    dst: SsaOperand::Local(0),
                    src: SsaOperand::Empty,
                }),
                step(SsaOp::Return {
                    value: SsaOperand::Reg(StepRef {
                        block: BlockId(0),
                        index: 0,
                    }),
                }),
            ],
        }]);
        let errors = verify(&module).unwrap_err();
        assert!(errors.iter().any(|e| e.message.contains("produces no value")));
    }
}
