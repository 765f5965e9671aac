//! A small stack-machine interpreter for deployed contract payloads.
//!
//! Faults that make the bytecode meaningless (stack underflow, type
//! mismatches, unknown opcodes, bad jump targets) are error kinds.
//! Running out of gas is not a fault: it is a first-class termination
//! reason carried in the receipt, alongside normal completion and an
//! explicit revert.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// A value on the stack, in memory or in contract storage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Int(i64),
    Num(f64),
    Str(String),
    Bool(bool),
}

impl Value {
    fn truthy(&self) -> bool {
        match self {
            Value::Int(v) => *v != 0,
            Value::Num(v) => *v != 0.0,
            Value::Str(v) => !v.is_empty(),
            Value::Bool(v) => *v,
        }
    }

    fn type_name(&self) -> &'static str {
        match self {
            Value::Int(_) => "int",
            Value::Num(_) => "num",
            Value::Str(_) => "str",
            Value::Bool(_) => "bool",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Opcode {
    Stop,
    Push,
    PushInt,
    Pop,
    Dup,
    Swap,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Eq,
    Lt,
    Gt,
    Not,
    SStore,
    SLoad,
    MStore,
    MLoad,
    Jump,
    JumpI,
    JumpDest,
    Return,
    Revert,
    Caller,
    ContractAddress,
    Gas,
    Log0,
}

impl Opcode {
    fn from_byte(byte: u8) -> Option<Opcode> {
        Some(match byte {
            0x00 => Opcode::Stop,
            0x60 => Opcode::Push,
            0x61 => Opcode::PushInt,
            0x50 => Opcode::Pop,
            0x80 => Opcode::Dup,
            0x90 => Opcode::Swap,
            0x01 => Opcode::Add,
            0x03 => Opcode::Sub,
            0x02 => Opcode::Mul,
            0x04 => Opcode::Div,
            0x06 => Opcode::Mod,
            0x14 => Opcode::Eq,
            0x10 => Opcode::Lt,
            0x11 => Opcode::Gt,
            0x19 => Opcode::Not,
            0x55 => Opcode::SStore,
            0x54 => Opcode::SLoad,
            0x52 => Opcode::MStore,
            0x51 => Opcode::MLoad,
            0x56 => Opcode::Jump,
            0x57 => Opcode::JumpI,
            0x5b => Opcode::JumpDest,
            0xf3 => Opcode::Return,
            0xfd => Opcode::Revert,
            0x33 => Opcode::Caller,
            0x30 => Opcode::ContractAddress,
            0x5a => Opcode::Gas,
            0xa0 => Opcode::Log0,
            _ => return None,
        })
    }

    fn to_byte(self) -> u8 {
        match self {
            Opcode::Stop => 0x00,
            Opcode::Push => 0x60,
            Opcode::PushInt => 0x61,
            Opcode::Pop => 0x50,
            Opcode::Dup => 0x80,
            Opcode::Swap => 0x90,
            Opcode::Add => 0x01,
            Opcode::Sub => 0x03,
            Opcode::Mul => 0x02,
            Opcode::Div => 0x04,
            Opcode::Mod => 0x06,
            Opcode::Eq => 0x14,
            Opcode::Lt => 0x10,
            Opcode::Gt => 0x11,
            Opcode::Not => 0x19,
            Opcode::SStore => 0x55,
            Opcode::SLoad => 0x54,
            Opcode::MStore => 0x52,
            Opcode::MLoad => 0x51,
            Opcode::Jump => 0x56,
            Opcode::JumpI => 0x57,
            Opcode::JumpDest => 0x5b,
            Opcode::Return => 0xf3,
            Opcode::Revert => 0xfd,
            Opcode::Caller => 0x33,
            Opcode::ContractAddress => 0x30,
            Opcode::Gas => 0x5a,
            Opcode::Log0 => 0xa0,
        }
    }

    fn gas_cost(self) -> u64 {
        match self {
            Opcode::SStore => 20_000,
            Opcode::SLoad => 200,
            Opcode::Mul | Opcode::Div | Opcode::Mod => 5,
            Opcode::Pop => 2,
            _ => 3,
        }
    }
}

/// Faults that abort execution. Running out of gas is deliberately not
/// here.
#[derive(Debug, PartialEq, Error, Clone)]
pub enum VmError {
    #[error("Stack underflow at offset {0}")]
    StackUnderflow(usize),
    #[error("Type mismatch at offset {offset}: {op} cannot take {got}")]
    TypeMismatch {
        offset: usize,
        op: &'static str,
        got: &'static str,
    },
    #[error("Division by zero at offset {0}")]
    DivisionByZero(usize),
    #[error("Unknown opcode 0x{0:02x}")]
    UnknownOpcode(u8),
    #[error("Jump to invalid target {0}")]
    InvalidJump(usize),
    #[error("Truncated immediate at offset {0}")]
    TruncatedImmediate(usize),
    #[error("Invalid assembly: {0}")]
    InvalidAssembly(String),
}

/// Why execution stopped. `OutOfGas` is a normal outcome, not a fault.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Termination {
    Completed,
    Reverted,
    OutOfGas,
}

/// Execution context for one contract call.
#[derive(Debug, Clone)]
pub struct VmContext {
    pub sender: String,
    pub contract_address: String,
    pub gas_limit: u64,
    pub storage: HashMap<String, Value>,
}

impl VmContext {
    pub fn new(
        sender: impl Into<String>,
        contract_address: impl Into<String>,
        gas_limit: u64,
    ) -> Self {
        VmContext {
            sender: sender.into(),
            contract_address: contract_address.into(),
            gas_limit,
            storage: HashMap::new(),
        }
    }
}

/// The result of a run: how it ended, what it cost and what it left
/// behind.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionReceipt {
    pub termination: Termination,
    pub gas_used: u64,
    pub return_value: Option<Value>,
    pub storage: HashMap<String, Value>,
    pub logs: Vec<String>,
}

struct Machine<'a> {
    bytecode: &'a [u8],
    pc: usize,
    stack: Vec<Value>,
    memory: HashMap<String, Value>,
    logs: Vec<String>,
    gas_used: u64,
}

impl<'a> Machine<'a> {
    fn pop(&mut self) -> Result<Value, VmError> {
        self.stack.pop().ok_or(VmError::StackUnderflow(self.pc))
    }

    fn pop_key(&mut self, op: &'static str) -> Result<String, VmError> {
        match self.pop()? {
            Value::Str(key) => Ok(key),
            other => Err(VmError::TypeMismatch {
                offset: self.pc,
                op,
                got: other.type_name(),
            }),
        }
    }

    fn read_byte(&mut self) -> Result<u8, VmError> {
        let byte = *self
            .bytecode
            .get(self.pc)
            .ok_or(VmError::TruncatedImmediate(self.pc))?;
        self.pc += 1;
        Ok(byte)
    }

    fn binary_numeric(
        &mut self,
        op: &'static str,
        int_op: fn(i64, i64) -> Option<i64>,
        num_op: fn(f64, f64) -> f64,
    ) -> Result<(), VmError> {
        let b = self.pop()?;
        let a = self.pop()?;
        let result = match (&a, &b) {
            (Value::Int(a), Value::Int(b)) => {
                Value::Int(int_op(*a, *b).ok_or(VmError::DivisionByZero(self.pc))?)
            }
            (Value::Num(a), Value::Num(b)) => Value::Num(num_op(*a, *b)),
            _ => {
                return Err(VmError::TypeMismatch {
                    offset: self.pc,
                    op,
                    got: if matches!(a, Value::Int(_) | Value::Num(_)) {
                        b.type_name()
                    } else {
                        a.type_name()
                    },
                })
            }
        };
        self.stack.push(result);
        Ok(())
    }
}

/// Runs `bytecode` against `context` until it stops, reverts, faults or
/// exhausts the gas limit.
pub fn execute(bytecode: &[u8], context: &mut VmContext) -> Result<ExecutionReceipt, VmError> {
    let mut machine = Machine {
        bytecode,
        pc: 0,
        stack: Vec::new(),
        memory: HashMap::new(),
        logs: Vec::new(),
        gas_used: 0,
    };

    let termination;
    let mut return_value = None;

    'run: loop {
        if machine.pc >= bytecode.len() {
            termination = Termination::Completed;
            break;
        }
        let byte = bytecode[machine.pc];
        machine.pc += 1;
        let op = Opcode::from_byte(byte).ok_or(VmError::UnknownOpcode(byte))?;

        if machine.gas_used + op.gas_cost() > context.gas_limit {
            termination = Termination::OutOfGas;
            break 'run;
        }
        machine.gas_used += op.gas_cost();

        match op {
            Opcode::Stop => {
                termination = Termination::Completed;
                break 'run;
            }
            Opcode::Push => {
                let len = machine.read_byte()? as usize;
                if machine.pc + len > bytecode.len() {
                    return Err(VmError::TruncatedImmediate(machine.pc));
                }
                let raw = &bytecode[machine.pc..machine.pc + len];
                machine.pc += len;
                let text = String::from_utf8_lossy(raw).into_owned();
                machine.stack.push(Value::Str(text));
            }
            Opcode::PushInt => {
                if machine.pc + 8 > bytecode.len() {
                    return Err(VmError::TruncatedImmediate(machine.pc));
                }
                let mut raw = [0u8; 8];
                raw.copy_from_slice(&bytecode[machine.pc..machine.pc + 8]);
                machine.pc += 8;
                machine.stack.push(Value::Int(i64::from_le_bytes(raw)));
            }
            Opcode::Pop => {
                machine.pop()?;
            }
            Opcode::Dup => {
                let top = machine
                    .stack
                    .last()
                    .cloned()
                    .ok_or(VmError::StackUnderflow(machine.pc))?;
                machine.stack.push(top);
            }
            Opcode::Swap => {
                let len = machine.stack.len();
                if len < 2 {
                    return Err(VmError::StackUnderflow(machine.pc));
                }
                machine.stack.swap(len - 1, len - 2);
            }
            Opcode::Add => {
                machine.binary_numeric("ADD", |a, b| Some(a.wrapping_add(b)), |a, b| a + b)?
            }
            Opcode::Sub => {
                machine.binary_numeric("SUB", |a, b| Some(a.wrapping_sub(b)), |a, b| a - b)?
            }
            Opcode::Mul => {
                machine.binary_numeric("MUL", |a, b| Some(a.wrapping_mul(b)), |a, b| a * b)?
            }
            Opcode::Div => machine.binary_numeric(
                "DIV",
                |a, b| if b == 0 { None } else { Some(a / b) },
                |a, b| a / b,
            )?,
            Opcode::Mod => machine.binary_numeric(
                "MOD",
                |a, b| if b == 0 { None } else { Some(a % b) },
                |a, b| a % b,
            )?,
            Opcode::Eq => {
                let b = machine.pop()?;
                let a = machine.pop()?;
                machine.stack.push(Value::Bool(a == b));
            }
            Opcode::Lt => {
                let b = machine.pop()?;
                let a = machine.pop()?;
                match (a, b) {
                    (Value::Int(a), Value::Int(b)) => machine.stack.push(Value::Bool(a < b)),
                    (Value::Num(a), Value::Num(b)) => machine.stack.push(Value::Bool(a < b)),
                    (a, _) => {
                        return Err(VmError::TypeMismatch {
                            offset: machine.pc,
                            op: "LT",
                            got: a.type_name(),
                        })
                    }
                }
            }
            Opcode::Gt => {
                let b = machine.pop()?;
                let a = machine.pop()?;
                match (a, b) {
                    (Value::Int(a), Value::Int(b)) => machine.stack.push(Value::Bool(a > b)),
                    (Value::Num(a), Value::Num(b)) => machine.stack.push(Value::Bool(a > b)),
                    (a, _) => {
                        return Err(VmError::TypeMismatch {
                            offset: machine.pc,
                            op: "GT",
                            got: a.type_name(),
                        })
                    }
                }
            }
            Opcode::Not => {
                let a = machine.pop()?;
                machine.stack.push(Value::Bool(!a.truthy()));
            }
            Opcode::SStore => {
                let value = machine.pop()?;
                let key = machine.pop_key("SSTORE")?;
                context.storage.insert(key, value);
            }
            Opcode::SLoad => {
                let key = machine.pop_key("SLOAD")?;
                let value = context.storage.get(&key).cloned().unwrap_or(Value::Int(0));
                machine.stack.push(value);
            }
            Opcode::MStore => {
                let value = machine.pop()?;
                let key = machine.pop_key("MSTORE")?;
                machine.memory.insert(key, value);
            }
            Opcode::MLoad => {
                let key = machine.pop_key("MLOAD")?;
                let value = machine.memory.get(&key).cloned().unwrap_or(Value::Int(0));
                machine.stack.push(value);
            }
            Opcode::Jump => {
                let target = jump_target(machine.pop()?, machine.pc)?;
                check_jump_dest(bytecode, target)?;
                machine.pc = target;
            }
            Opcode::JumpI => {
                let condition = machine.pop()?;
                let target = jump_target(machine.pop()?, machine.pc)?;
                if condition.truthy() {
                    check_jump_dest(bytecode, target)?;
                    machine.pc = target;
                }
            }
            Opcode::JumpDest => {}
            Opcode::Return => {
                return_value = Some(machine.pop()?);
                termination = Termination::Completed;
                break 'run;
            }
            Opcode::Revert => {
                termination = Termination::Reverted;
                break 'run;
            }
            Opcode::Caller => {
                machine.stack.push(Value::Str(context.sender.clone()));
            }
            Opcode::ContractAddress => {
                machine
                    .stack
                    .push(Value::Str(context.contract_address.clone()));
            }
            Opcode::Gas => {
                let remaining = context.gas_limit - machine.gas_used;
                machine.stack.push(Value::Int(remaining as i64));
            }
            Opcode::Log0 => {
                let data = machine.pop()?;
                if let Value::Str(text) = data {
                    machine.logs.push(text);
                }
            }
        }
    }

    Ok(ExecutionReceipt {
        termination,
        gas_used: machine.gas_used,
        return_value,
        // Reverted runs still report the storage view for inspection;
        // callers discard it.
        storage: context.storage.clone(),
        logs: machine.logs,
    })
}

fn jump_target(value: Value, offset: usize) -> Result<usize, VmError> {
    match value {
        Value::Int(target) if target >= 0 => Ok(target as usize),
        Value::Int(_) => Err(VmError::InvalidJump(offset)),
        other => Err(VmError::TypeMismatch {
            offset,
            op: "JUMP",
            got: other.type_name(),
        }),
    }
}

fn check_jump_dest(bytecode: &[u8], target: usize) -> Result<(), VmError> {
    if bytecode.get(target) == Some(&Opcode::JumpDest.to_byte()) {
        Ok(())
    } else {
        Err(VmError::InvalidJump(target))
    }
}

/// Assembles a line-based mnemonic listing into bytecode. One
/// instruction per line; `PUSH <text>` and `PUSHI <int>` take an
/// operand, everything else is bare. Lines starting with `#` and blank
/// lines are skipped. This is the format contract-deploy payloads
/// carry.
pub fn assemble(source: &str) -> Result<Vec<u8>, VmError> {
    let mut bytecode = Vec::new();
    for line in source.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let (mnemonic, operand) = match line.split_once(' ') {
            Some((m, rest)) => (m, Some(rest.trim())),
            None => (line, None),
        };
        match (mnemonic.to_ascii_uppercase().as_str(), operand) {
            ("PUSH", Some(text)) => {
                bytecode.push(Opcode::Push.to_byte());
                let raw = text.as_bytes();
                bytecode.push(raw.len().min(255) as u8);
                bytecode.extend_from_slice(&raw[..raw.len().min(255)]);
            }
            ("PUSHI", Some(text)) => {
                let value: i64 = text
                    .parse()
                    .map_err(|_| VmError::InvalidAssembly(format!("bad integer: {text}")))?;
                bytecode.push(Opcode::PushInt.to_byte());
                bytecode.extend_from_slice(&value.to_le_bytes());
            }
            ("POP", None) => bytecode.push(Opcode::Pop.to_byte()),
            ("DUP", None) => bytecode.push(Opcode::Dup.to_byte()),
            ("SWAP", None) => bytecode.push(Opcode::Swap.to_byte()),
            ("ADD", None) => bytecode.push(Opcode::Add.to_byte()),
            ("SUB", None) => bytecode.push(Opcode::Sub.to_byte()),
            ("MUL", None) => bytecode.push(Opcode::Mul.to_byte()),
            ("DIV", None) => bytecode.push(Opcode::Div.to_byte()),
            ("MOD", None) => bytecode.push(Opcode::Mod.to_byte()),
            ("EQ", None) => bytecode.push(Opcode::Eq.to_byte()),
            ("LT", None) => bytecode.push(Opcode::Lt.to_byte()),
            ("GT", None) => bytecode.push(Opcode::Gt.to_byte()),
            ("NOT", None) => bytecode.push(Opcode::Not.to_byte()),
            ("SSTORE", None) => bytecode.push(Opcode::SStore.to_byte()),
            ("SLOAD", None) => bytecode.push(Opcode::SLoad.to_byte()),
            ("MSTORE", None) => bytecode.push(Opcode::MStore.to_byte()),
            ("MLOAD", None) => bytecode.push(Opcode::MLoad.to_byte()),
            ("JUMP", None) => bytecode.push(Opcode::Jump.to_byte()),
            ("JUMPI", None) => bytecode.push(Opcode::JumpI.to_byte()),
            ("JUMPDEST", None) => bytecode.push(Opcode::JumpDest.to_byte()),
            ("RETURN", None) => bytecode.push(Opcode::Return.to_byte()),
            ("REVERT", None) => bytecode.push(Opcode::Revert.to_byte()),
            ("CALLER", None) => bytecode.push(Opcode::Caller.to_byte()),
            ("ADDRESS", None) => bytecode.push(Opcode::ContractAddress.to_byte()),
            ("GAS", None) => bytecode.push(Opcode::Gas.to_byte()),
            ("LOG0", None) => bytecode.push(Opcode::Log0.to_byte()),
            _ => return Err(VmError::InvalidAssembly(line.to_string())),
        }
    }
    Ok(bytecode)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(source: &str, gas_limit: u64) -> Result<ExecutionReceipt, VmError> {
        let bytecode = assemble(source).unwrap();
        let mut context = VmContext::new("NILcaller", "CONTRACT-0011223344", gas_limit);
        execute(&bytecode, &mut context)
    }

    #[test]
    fn arithmetic_and_return() {
        let receipt = run("PUSHI 2\nPUSHI 3\nMUL\nPUSHI 4\nADD\nRETURN", 1_000).unwrap();
        assert_eq!(receipt.termination, Termination::Completed);
        assert_eq!(receipt.return_value, Some(Value::Int(10)));
        assert!(receipt.gas_used > 0);
    }

    #[test]
    fn storage_round_trip() {
        let receipt = run(
            "PUSH counter\nPUSHI 41\nSSTORE\nPUSH counter\nSLOAD\nPUSHI 1\nADD\nRETURN",
            100_000,
        )
        .unwrap();
        assert_eq!(receipt.return_value, Some(Value::Int(42)));
        assert_eq!(receipt.storage.get("counter"), Some(&Value::Int(41)));
    }

    #[test]
    fn missing_storage_key_loads_zero() {
        let receipt = run("PUSH absent\nSLOAD\nRETURN", 10_000).unwrap();
        assert_eq!(receipt.return_value, Some(Value::Int(0)));
    }

    #[test]
    fn out_of_gas_is_a_termination_not_an_error() {
        // SSTORE costs 20 000; the limit covers the pushes only.
        let result = run("PUSH k\nPUSHI 1\nSSTORE", 100);
        let receipt = result.unwrap();
        assert_eq!(receipt.termination, Termination::OutOfGas);
        // Storage write never happened.
        assert!(receipt.storage.is_empty());
    }

    #[test]
    fn revert_is_a_termination() {
        let receipt = run("PUSHI 1\nREVERT", 1_000).unwrap();
        assert_eq!(receipt.termination, Termination::Reverted);
        assert_eq!(receipt.return_value, None);
    }

    #[test]
    fn stack_underflow_is_an_error() {
        assert!(matches!(run("ADD", 1_000), Err(VmError::StackUnderflow(_))));
    }

    #[test]
    fn type_mismatch_is_an_error() {
        assert!(matches!(
            run("PUSH a\nPUSHI 1\nADD", 1_000),
            Err(VmError::TypeMismatch { op: "ADD", .. })
        ));
    }

    #[test]
    fn division_by_zero_is_an_error() {
        assert!(matches!(
            run("PUSHI 1\nPUSHI 0\nDIV", 1_000),
            Err(VmError::DivisionByZero(_))
        ));
    }

    #[test]
    fn unknown_opcode_is_an_error() {
        let mut context = VmContext::new("NILcaller", "CONTRACT-0011223344", 1_000);
        assert_eq!(
            execute(&[0xee], &mut context),
            Err(VmError::UnknownOpcode(0xee))
        );
    }

    #[test]
    fn jump_skips_forward_to_jumpdest() {
        // Jump over a REVERT to the JUMPDEST at the end. The PUSHI
        // immediate is 9 bytes, JUMP and REVERT one each, so the
        // JUMPDEST sits at offset 11.
        let source = "PUSHI 11\nJUMP\nREVERT\nJUMPDEST\nPUSHI 7\nRETURN";
        let bytecode = assemble(source).unwrap();
        assert_eq!(bytecode[11], Opcode::JumpDest.to_byte());
        let mut context = VmContext::new("NILcaller", "CONTRACT-0011223344", 1_000);
        let receipt = execute(&bytecode, &mut context).unwrap();
        assert_eq!(receipt.return_value, Some(Value::Int(7)));
    }

    #[test]
    fn jump_to_non_dest_is_an_error() {
        assert!(matches!(
            run("PUSHI 0\nJUMP", 1_000),
            Err(VmError::InvalidJump(0))
        ));
    }

    #[test]
    fn conditional_jump_falls_through_on_false() {
        let source = "PUSHI 29\nPUSHI 0\nJUMPI\nPUSHI 1\nRETURN\nJUMPDEST\nPUSHI 2\nRETURN";
        let bytecode = assemble(source).unwrap();
        let mut context = VmContext::new("NILcaller", "CONTRACT-0011223344", 1_000);
        let receipt = execute(&bytecode, &mut context).unwrap();
        assert_eq!(receipt.return_value, Some(Value::Int(1)));
    }

    #[test]
    fn caller_and_address_reach_the_stack() {
        let receipt = run("CALLER\nLOG0\nADDRESS\nRETURN", 1_000).unwrap();
        assert_eq!(receipt.logs, vec!["NILcaller".to_string()]);
        assert_eq!(
            receipt.return_value,
            Some(Value::Str("CONTRACT-0011223344".to_string()))
        );
    }

    #[test]
    fn comments_and_blank_lines_are_skipped() {
        let receipt = run("# a counter\n\nPUSHI 5\nRETURN", 1_000).unwrap();
        assert_eq!(receipt.return_value, Some(Value::Int(5)));
    }
}
