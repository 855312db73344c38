use std::collections::BTreeSet;

use crate::float::Float;
use crate::opcode::{OpCode, Operand};

use super::Function;

impl<F: Float> Function<F> {
    /// Jacobian sparsity by forward propagation: for each dependent, the
    /// independents it structurally depends on.
    ///
    /// Conditional expressions count both branches, taped vectors count
    /// every value stored before a load, and atomic calls use
    /// [`AtomicOp::for_jac_sparsity`](crate::AtomicOp::for_jac_sparsity).
    /// Comparisons and rounding functions contribute nothing.
    pub fn for_jac_sparsity(&self) -> Vec<BTreeSet<usize>> {
        let log = &self.log;
        let n = log.num_nodes();
        let mut sets: Vec<BTreeSet<usize>> = vec![BTreeSet::new(); n];
        let mut vec_sets: Vec<BTreeSet<usize>> = vec![BTreeSet::new(); log.vectors.len()];

        for (j, set) in sets.iter_mut().enumerate().take(log.num_independent()) {
            set.insert(j);
        }

        let mut i = log.num_independent();
        while i < n {
            let args = log.node_args(i);
            let set = match log.ops[i] {
                OpCode::AtomicCall => {
                    let inputs: Vec<BTreeSet<usize>> =
                        args[2..].iter().map(|&raw| operand_set(&sets, raw)).collect();
                    let n_out = args[1] as usize;
                    let outs = log.atomics[args[0] as usize].for_jac_sparsity(&inputs, n_out);
                    for (k, out) in outs.into_iter().enumerate().take(n_out) {
                        sets[i + 1 + k] = out;
                    }
                    i += 1 + n_out;
                    continue;
                }
                OpCode::Input | OpCode::AtomicOut | OpCode::Compare(_) => BTreeSet::new(),
                op if op.is_piecewise_constant() => BTreeSet::new(),
                OpCode::CondExpr(_) => {
                    let mut s = operand_set(&sets, args[2]);
                    s.extend(operand_set(&sets, args[3]));
                    s
                }
                OpCode::Store => {
                    let stored = operand_set(&sets, args[2]);
                    vec_sets[args[0] as usize].extend(stored);
                    BTreeSet::new()
                }
                OpCode::Load => vec_sets[args[0] as usize].clone(),
                op => {
                    let mut s = operand_set(&sets, args[0]);
                    if op.is_binary() {
                        s.extend(operand_set(&sets, args[1]));
                    }
                    s
                }
            };
            sets[i] = set;
            i += 1;
        }

        self.dependents
            .iter()
            .map(|&raw| operand_set(&sets, raw))
            .collect()
    }

    /// Jacobian sparsity by reverse propagation. Same pattern as
    /// [`for_jac_sparsity`](Self::for_jac_sparsity), computed from the
    /// dependents back; atomic calls use
    /// [`AtomicOp::rev_jac_sparsity`](crate::AtomicOp::rev_jac_sparsity).
    pub fn rev_jac_sparsity(&self) -> Vec<BTreeSet<usize>> {
        let log = &self.log;
        let n = log.num_nodes();
        let m = self.num_dependent();
        // reach[slot] = dependents that read the slot.
        let mut reach: Vec<BTreeSet<usize>> = vec![BTreeSet::new(); n];
        let mut vec_reach: Vec<BTreeSet<usize>> = vec![BTreeSet::new(); log.vectors.len()];

        for (i, &raw) in self.dependents.iter().enumerate() {
            if let Operand::Slot(s) = Operand::decode(raw) {
                reach[s as usize].insert(i);
            }
        }

        for i in (log.num_independent()..n).rev() {
            let args = log.node_args(i);
            match log.ops[i] {
                OpCode::AtomicCall => {
                    let n_out = args[1] as usize;
                    let outs: Vec<BTreeSet<usize>> =
                        (0..n_out).map(|k| reach[i + 1 + k].clone()).collect();
                    let inputs = &args[2..];
                    let ins = log.atomics[args[0] as usize].rev_jac_sparsity(inputs.len(), &outs);
                    for (&raw, set) in inputs.iter().zip(ins) {
                        extend_operand(&mut reach, raw, &set);
                    }
                }
                OpCode::Input | OpCode::AtomicOut | OpCode::Compare(_) => {}
                op if op.is_piecewise_constant() => {}
                OpCode::CondExpr(_) => {
                    let here = std::mem::take(&mut reach[i]);
                    extend_operand(&mut reach, args[2], &here);
                    extend_operand(&mut reach, args[3], &here);
                }
                OpCode::Load => {
                    let here = std::mem::take(&mut reach[i]);
                    vec_reach[args[0] as usize].extend(here);
                }
                OpCode::Store => {
                    let stored = vec_reach[args[0] as usize].clone();
                    extend_operand(&mut reach, args[2], &stored);
                }
                op => {
                    let here = std::mem::take(&mut reach[i]);
                    extend_operand(&mut reach, args[0], &here);
                    if op.is_binary() {
                        extend_operand(&mut reach, args[1], &here);
                    }
                }
            }
        }

        let mut pattern = vec![BTreeSet::new(); m];
        for (j, deps) in reach.iter().enumerate().take(log.num_independent()) {
            for &i in deps {
                pattern[i].insert(j);
            }
        }
        pattern
    }
}

fn operand_set(sets: &[BTreeSet<usize>], raw: u32) -> BTreeSet<usize> {
    match Operand::decode(raw) {
        Operand::Slot(s) => sets[s as usize].clone(),
        Operand::Const(_) => BTreeSet::new(),
    }
}

fn extend_operand(reach: &mut [BTreeSet<usize>], raw: u32, set: &BTreeSet<usize>) {
    if let Operand::Slot(s) = Operand::decode(raw) {
        reach[s as usize].extend(set.iter().copied());
    }
}
