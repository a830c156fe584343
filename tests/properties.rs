use ls8::cpu::alu;
use ls8::cpu::decode::{decode, DecodeError, Instruction, OPCODES};
use ls8::cpu::registers::{flags, STACK_TOP};
use ls8::cpu::{stack, ManualClock};
use ls8::{Cpu, CpuError, Memory, Opcode, Registers};
use proptest::prelude::*;

fn opcode_strategy() -> impl Strategy<Value = Opcode> {
    (0..OPCODES.len()).prop_map(|i| OPCODES[i].0)
}

fn registers_with(x: u8, y: u8) -> Registers {
    let mut regs = Registers::new();
    regs.gp[0] = x;
    regs.gp[1] = y;
    regs
}

#[test]
fn opcode_bits_match_table() {
    // Spot checks against the published encoding.
    let cases = [
        (Opcode::Hlt, 0, false, false),
        (Opcode::Ldi, 2, false, false),
        (Opcode::Add, 2, true, false),
        (Opcode::Inc, 1, true, false),
        (Opcode::Call, 1, false, true),
        (Opcode::Ret, 0, false, true),
        (Opcode::Jeq, 1, false, true),
        (Opcode::Int, 1, false, true),
    ];

    for (op, operands, alu, sets_pc) in cases {
        assert_eq!(op.operand_count(), operands, "{}", op);
        assert_eq!(op.is_alu(), alu, "{}", op);
        assert_eq!(op.sets_pc(), sets_pc, "{}", op);
    }
}

proptest! {
    #[test]
    fn decode_accepts_exactly_the_table(byte in any::<u8>()) {
        let listed = OPCODES.iter().find(|(op, _)| op.byte() == byte);

        match (decode(byte), listed) {
            (Ok(op), Some((expected, _))) => prop_assert_eq!(op, *expected),
            (Err(DecodeError::InvalidInstruction(b)), None) => prop_assert_eq!(b, byte),
            (result, listed) => prop_assert!(false, "{:#04x}: {:?} vs {:?}", byte, result, listed),
        }
    }

    #[test]
    fn instruction_length_follows_operand_bits(op in opcode_strategy(), a in any::<u8>(), b in any::<u8>()) {
        let instr = Instruction::new(op, a, b);

        prop_assert_eq!(instr.len(), 1 + (op.byte() >> 6) as usize);
        prop_assert_eq!(instr.encode().len(), instr.len());
        prop_assert_eq!(instr.encode()[0], op.byte());
    }

    #[test]
    fn compare_sets_exactly_one_flag(x in any::<u8>(), y in any::<u8>()) {
        let mut regs = registers_with(x, y);
        alu::apply(&mut regs, Opcode::Cmp, 0, 1).unwrap();

        prop_assert_eq!(regs.fl.count_ones(), 1);
        prop_assert_eq!(regs.flag(flags::E), x == y);
        prop_assert_eq!(regs.flag(flags::G), x > y);
        prop_assert_eq!(regs.flag(flags::L), x < y);
        prop_assert_eq!(regs.gp[0], x);
    }

    #[test]
    fn arithmetic_wraps(x in any::<u8>(), y in any::<u8>()) {
        let cases = [
            (Opcode::Add, x.wrapping_add(y)),
            (Opcode::Sub, x.wrapping_sub(y)),
            (Opcode::Mul, x.wrapping_mul(y)),
            (Opcode::And, x & y),
            (Opcode::Or, x | y),
            (Opcode::Xor, x ^ y),
            (Opcode::Not, !x),
            (Opcode::Inc, x.wrapping_add(1)),
            (Opcode::Dec, x.wrapping_sub(1)),
        ];

        for (op, expected) in cases {
            let mut regs = registers_with(x, y);
            alu::apply(&mut regs, op, 0, 1).unwrap();
            prop_assert_eq!(regs.gp[0], expected, "{}", op);
            prop_assert_eq!(regs.gp[1], y);
        }
    }

    #[test]
    fn shifts_past_width_clear(x in any::<u8>(), y in any::<u8>()) {
        let mut regs = registers_with(x, y);
        alu::apply(&mut regs, Opcode::Shl, 0, 1).unwrap();
        let expected = if y >= 8 { 0 } else { x << y };
        prop_assert_eq!(regs.gp[0], expected);

        let mut regs = registers_with(x, y);
        alu::apply(&mut regs, Opcode::Shr, 0, 1).unwrap();
        let expected = if y >= 8 { 0 } else { x >> y };
        prop_assert_eq!(regs.gp[0], expected);
    }

    #[test]
    fn divide_by_zero_leaves_registers(x in any::<u8>(), op in prop_oneof![Just(Opcode::Div), Just(Opcode::Mod)]) {
        let mut regs = registers_with(x, 0);
        let before = regs.clone();

        prop_assert_eq!(alu::apply(&mut regs, op, 0, 1), Err(CpuError::DivisionByZero));
        prop_assert_eq!(regs, before);
    }

    #[test]
    fn push_then_pop_round_trips(values in prop::collection::vec(any::<u8>(), 0..64)) {
        let mut regs = Registers::new();
        let mut mem = Memory::new();

        for &v in &values {
            stack::push(&mut regs, &mut mem, v).unwrap();
        }
        for &v in values.iter().rev() {
            prop_assert_eq!(stack::pop(&mut regs, &mem).unwrap(), v);
        }
        prop_assert_eq!(regs.sp(), STACK_TOP);
    }

    #[test]
    fn arbitrary_memory_never_panics(image in prop::collection::vec(any::<u8>(), 256)) {
        let clock = ManualClock::new();
        let mut cpu = Cpu::with_clock(clock.clone());
        cpu.load_program(&image).unwrap();

        // Faults are fine; panics are not.
        let _ = cpu.run_limited(200);
        clock.advance(1);
        let _ = cpu.run_limited(200);

        prop_assert!(cpu.cycles <= 400);
    }
}
