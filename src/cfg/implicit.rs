//! Implicit-definition cache
//!
//! Dataflow analysis needs a definition for every location used before
//! being assigned; those locations are defined "implicitly" at procedure
//! entry. The cache maps each location to the single implicit assignment
//! representing it, so repeated queries for the same location always
//! resolve to the same statement.
//!
//! Keys are canonical subscript-free forms: a location looked up before
//! and after SSA renaming must hit the same entry.

use crate::cfg::ProcCfg;
use crate::ir::expr::Expr;
use crate::ir::stmt::StmtId;
use crate::proc::Parameter;

impl ProcCfg {
    /// Find the implicit entry definition for `expr`, creating it on first
    /// use.
    ///
    /// The created statement lives at the front of the entry block, after
    /// any implicit definitions already there. Returns `None` only when the
    /// CFG has no entry block to hold the definition.
    pub fn find_or_create_implicit_assign(&mut self, expr: &Expr) -> Option<StmtId> {
        let key = expr.strip_subscripts();
        if let Some(&id) = self.implicit_map().get(&key) {
            return Some(id);
        }

        let entry = self.entry_bb()?;
        let id = self.mint_stmt_id();
        self.block_mut(entry)?.add_implicit_assign(id, key.clone());
        self.implicit_map_mut().insert(key, id);
        Some(id)
    }

    /// Pure lookup variant of
    /// [`find_or_create_implicit_assign`](Self::find_or_create_implicit_assign);
    /// never creates anything.
    pub fn find_the_implicit_assign(&self, expr: &Expr) -> Option<StmtId> {
        self.implicit_map().get(&expr.strip_subscripts()).copied()
    }

    /// Find the implicit definition for a formal parameter.
    ///
    /// Matches the parameter's location expression ignoring subscripts,
    /// falling back to the canonical parameter location for its name.
    pub fn find_implicit_param_assign(&self, param: &Parameter) -> Option<StmtId> {
        if let Some(id) = self.find_the_implicit_assign(&param.exp) {
            return Some(id);
        }
        self.find_the_implicit_assign(&Expr::param(&param.name))
    }

    /// Remove the implicit definition for `expr` from both the cache and
    /// the entry block.
    ///
    /// Callers must only remove definitions they know exist; removal of an
    /// uncached location is a contract violation.
    pub fn remove_implicit_assign(&mut self, expr: &Expr) {
        let key = expr.strip_subscripts();
        let removed = self.implicit_map_mut().remove(&key);
        debug_assert!(
            removed.is_some(),
            "no implicit definition cached for {key}"
        );
        let Some(id) = removed else {
            return;
        };

        if let Some(entry) = self.entry_bb() {
            if let Some(bb) = self.block_mut(entry) {
                bb.remove_statement(id);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cfg::BlockKind;
    use crate::ir::{Address, MachineInstruction};
    use crate::proc::ProcId;

    fn cfg_with_entry() -> ProcCfg {
        let mut cfg = ProcCfg::new(ProcId(0));
        let batch = vec![MachineInstruction::new(Address(0x10), 4, "ret")];
        let entry = cfg.create_bb(BlockKind::Ret, batch).unwrap().unwrap();
        cfg.set_entry_and_exit_bb(entry);
        cfg
    }

    #[test]
    fn test_find_or_create_is_idempotent() {
        let mut cfg = cfg_with_entry();
        let first = cfg.find_or_create_implicit_assign(&Expr::Reg(28)).unwrap();
        let second = cfg.find_or_create_implicit_assign(&Expr::Reg(28)).unwrap();
        assert_eq!(first, second);

        let entry = cfg.entry_bb().unwrap();
        let implicits = cfg
            .block(entry)
            .unwrap()
            .statements()
            .iter()
            .filter(|s| s.is_implicit())
            .count();
        assert_eq!(implicits, 1);
    }

    #[test]
    fn test_subscripted_lookup_hits_same_entry() {
        let mut cfg = cfg_with_entry();
        let plain = cfg.find_or_create_implicit_assign(&Expr::Reg(28)).unwrap();
        let renamed = cfg
            .find_or_create_implicit_assign(&Expr::Reg(28).subscripted(3))
            .unwrap();
        assert_eq!(plain, renamed);
        assert_eq!(
            cfg.find_the_implicit_assign(&Expr::Reg(28).subscripted(7)),
            Some(plain)
        );
    }

    #[test]
    fn test_find_never_creates() {
        let cfg = cfg_with_entry();
        assert_eq!(cfg.find_the_implicit_assign(&Expr::Reg(28)), None);
    }

    #[test]
    fn test_no_entry_block_yields_none() {
        let mut cfg = ProcCfg::new(ProcId(0));
        assert_eq!(cfg.find_or_create_implicit_assign(&Expr::Reg(28)), None);
    }

    #[test]
    fn test_param_assign_falls_back_to_canonical_location() {
        let mut cfg = cfg_with_entry();
        let id = cfg
            .find_or_create_implicit_assign(&Expr::param("argc"))
            .unwrap();

        // the parameter currently lives in a register, but its canonical
        // location still resolves
        let param = Parameter::new("argc", Expr::Reg(4));
        assert_eq!(cfg.find_implicit_param_assign(&param), Some(id));

        let direct = Parameter::new("argc", Expr::param("argc").subscripted(1));
        assert_eq!(cfg.find_implicit_param_assign(&direct), Some(id));
    }

    #[test]
    fn test_remove_drops_cache_and_statement() {
        let mut cfg = cfg_with_entry();
        let id = cfg.find_or_create_implicit_assign(&Expr::Reg(28)).unwrap();
        let entry = cfg.entry_bb().unwrap();
        assert!(cfg
            .block(entry)
            .unwrap()
            .statements()
            .iter()
            .any(|s| s.id == id));

        cfg.remove_implicit_assign(&Expr::Reg(28));

        assert_eq!(cfg.find_the_implicit_assign(&Expr::Reg(28)), None);
        assert!(!cfg
            .block(entry)
            .unwrap()
            .statements()
            .iter()
            .any(|s| s.id == id));
    }
}
