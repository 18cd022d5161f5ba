use framevm::{
    bytecode::{disassemble, Decoded, Opcode},
    parser::{build_protocols, Parser},
    registry::Registry,
    vm::{Fault, Status},
    Compiler, CompilerOptions, Runtime, RuntimeOptions,
};

fn unfolded() -> Compiler {
    Compiler::new(CompilerOptions {
        folding: false,
        learning: false,
        ..CompilerOptions::default()
    })
}

#[test]
fn instruction_count_matches_content_lines() {
    let source = "\
# header comment

protocol main
instruct load 5

guide helper a b c
# trailing comment
x unknown
";
    let registry = Registry::new();
    let instructions = Parser::new(source, &registry).parse();
    assert_eq!(instructions.len(), 4);
}

#[test]
fn text_params_are_not_numbers() {
    let mut compiler = unfolded();
    let artifact = compiler
        .compile("protocol p\ninstruct load 5\ninstruct store 0\n")
        .unwrap();

    assert_eq!(
        artifact,
        vec![0x30, 0x01, 0, 0, 0, 1, b'5', 0x02, 0, 0, 0, 1, b'0', 0x32]
    );

    // LOAD takes the length prefix as its immediate and the text byte '5' (0x35)
    // lands where the next opcode is expected
    let records = disassemble(&artifact);
    assert_eq!(records[1].decoded, Decoded::Op(Opcode::Load));
    assert_eq!(records[1].immediate, Some(1));
    assert_eq!(records[2].decoded, Decoded::Unknown(b'5'));

    let mut runtime = Runtime::new(RuntimeOptions {
        self_healing: false,
        ..RuntimeOptions::default()
    });
    runtime.load(artifact);
    let status = runtime.execute();

    assert_eq!(
        status,
        Status::Failed {
            pc: 6,
            fault: Fault::UnknownOpcode(b'5'),
        }
    );
    assert_eq!(runtime.stack(), &[1]);
    assert_eq!(&runtime.memory()[0..4], &[0, 0, 0, 0]);
}

#[test]
fn healing_retries_once_then_fails() {
    let mut compiler = unfolded();
    let artifact = compiler
        .compile("protocol p\ninstruct load 5\ninstruct store 0\n")
        .unwrap();

    let mut runtime = Runtime::default();
    runtime.load(artifact);
    let status = runtime.execute();

    assert_eq!(status.exit_code(), 1);
    let restores = runtime
        .events()
        .iter()
        .filter(|e| *e == "State restored from checkpoint")
        .count();
    assert_eq!(restores, 1);
}

#[test]
fn binary_immediates_through_an_overlay() {
    // The overlay carries a real LOAD/STORE pair, which the generator inlines as is
    let mut store_five = vec![0x01, 0, 0, 0, 5];
    store_five.extend_from_slice(&[0x02, 0, 0, 0, 0]);

    let mut compiler = unfolded();
    let symbol = compiler.register_overlay("store_five", store_five).unwrap();
    let source = format!("protocol main\n{} store_five\n", symbol);
    let artifact = compiler.compile(&source).unwrap();

    let mut runtime = Runtime::default();
    runtime.load(artifact);
    assert_eq!(runtime.execute(), Status::Completed);
    assert_eq!(runtime.memory()[3], 5);
    assert_eq!(&runtime.memory()[0..3], &[0, 0, 0]);
}

#[test]
fn protocols_frame_in_order() {
    let source = "\
instruct add
protocol first
instruct push
instruct pop
protocol second
instruct sub
";
    let registry = Registry::new();
    let instructions = Parser::new(source, &registry).parse();
    let protocols = build_protocols(&instructions);
    let bytecode = framevm::bytecode::generate(&protocols, &registry).unwrap();

    let ops: Vec<Decoded> = disassemble(&bytecode).iter().map(|r| r.decoded).collect();
    assert_eq!(
        ops,
        vec![
            Decoded::Op(Opcode::FrameCreate),
            Decoded::Op(Opcode::Push),
            Decoded::Op(Opcode::Pop),
            Decoded::Op(Opcode::FrameExit),
            Decoded::Op(Opcode::FrameCreate),
            Decoded::Op(Opcode::Sub),
            Decoded::Op(Opcode::FrameExit),
        ]
    );
}

#[test]
fn default_pipeline_folds_and_strips() {
    let source = "protocol p\ninstruct load 1234\ninstruct load 1234\ninstruct add\n";
    let mut compiler = Compiler::default();
    let artifact = compiler.compile(source).unwrap();

    // 21 generated bytes fold twice down to one window id, which is 0 and stripped
    assert!(artifact.is_empty());
    assert_eq!(compiler.stats().compressed_size, 0);
    assert_eq!(compiler.stats().compression_ratio(), 1.0);

    // An empty artifact runs to completion
    let mut runtime = Runtime::default();
    runtime.load(artifact);
    assert_eq!(runtime.execute(), Status::Completed);
}
