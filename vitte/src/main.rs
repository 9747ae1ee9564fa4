use clap::{Parser, ValueEnum};
use log::info;

use vitte::{Chunk, GcHeap, OpCode, Value, Vm, disassemble, find_native};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Program {
    /// 42 + 8, printed
    Arith,
    /// a heap-allocated greeting, printed
    String,
    /// a counting loop from 3 down to 1
    Loop,
    /// build an array and print it
    Array,
}

#[derive(Parser, Debug)]
#[command(name = "vitte", about = "Vitte bytecode execution core")]
struct Args {
    /// Demo program to run
    #[arg(long, value_enum, default_value = "arith")]
    program: Program,

    /// Print the bytecode listing instead of executing
    #[arg(long)]
    disassemble: bool,

    /// Heap budget in bytes
    #[arg(long)]
    heap_limit: Option<usize>,

    /// Log every executed instruction
    #[arg(long)]
    trace: bool,

    /// Force a collection after execution and report the statistics
    #[arg(long)]
    collect: bool,
}

fn main() {
    let args = Args::parse();
    let mut logger = env_logger::Builder::from_default_env();
    if args.trace {
        logger.filter_level(log::LevelFilter::Trace);
    }
    logger.init();

    let mut heap = match args.heap_limit {
        Some(limit) => GcHeap::with_limit(limit),
        None => GcHeap::new(),
    };

    let chunk = match build_program(args.program, &mut heap) {
        Ok(chunk) => chunk,
        Err(err) => {
            eprintln!("error: {err}");
            std::process::exit(70);
        }
    };

    if args.disassemble {
        print!("{}", disassemble(&chunk, program_name(args.program)));
        return;
    }

    let mut vm = Vm::new();
    if let Err(err) = vm.execute(&chunk, &mut heap) {
        eprintln!("error: {err}");
        std::process::exit(70);
    }

    if args.collect {
        let (freed_objects, freed_bytes) = heap.collect(&vm);
        info!(
            "collection freed {freed_objects} object(s), {freed_bytes} byte(s); {} live",
            heap.bytes_allocated()
        );
    }
    info!(
        "done: {} instruction(s), {} byte(s) live, {} collection(s)",
        vm.instruction_count(),
        heap.bytes_allocated(),
        heap.gc_runs()
    );
}

fn program_name(program: Program) -> &'static str {
    match program {
        Program::Arith => "arith",
        Program::String => "string",
        Program::Loop => "loop",
        Program::Array => "array",
    }
}

fn build_program(program: Program, heap: &mut GcHeap) -> Result<Chunk, vitte::VmError> {
    let mut chunk = Chunk::new();
    match program {
        Program::Arith => {
            let a = chunk.add_constant(Value::Int(42));
            let b = chunk.add_constant(Value::Int(8));
            chunk.write_op(OpCode::Const, 1);
            chunk.write(a as u8, 1);
            chunk.write_op(OpCode::Const, 1);
            chunk.write(b as u8, 1);
            chunk.write_op(OpCode::Add, 1);
            chunk.write_op(OpCode::Print, 1);
            chunk.write_op(OpCode::Halt, 1);
        }
        Program::String => {
            let upper = find_native("strtoupper").ok_or_else(|| {
                vitte::VmError::new(vitte::VmErrorKind::Runtime, "missing builtin strtoupper")
            })?;
            let greeting = heap.alloc_str("Hello, Vitte!")?;
            let shouted = upper.call(heap, &[greeting])?;
            let plain = chunk.add_constant(greeting);
            let loud = chunk.add_constant(shouted);
            chunk.write_op(OpCode::Const, 1);
            chunk.write(plain as u8, 1);
            chunk.write_op(OpCode::Print, 1);
            chunk.write_op(OpCode::Const, 2);
            chunk.write(loud as u8, 2);
            chunk.write_op(OpCode::Print, 2);
            chunk.write_op(OpCode::Halt, 2);
        }
        Program::Loop => {
            let three = chunk.add_constant(Value::Int(3));
            let one = chunk.add_constant(Value::Int(1));
            let zero = chunk.add_constant(Value::Int(0));
            chunk.write_op(OpCode::Const, 1);
            chunk.write(three as u8, 1);
            // body: print, decrement, test, loop
            chunk.write_op(OpCode::GetLocal, 2);
            chunk.write(0, 2);
            chunk.write_op(OpCode::Print, 2);
            chunk.write_op(OpCode::GetLocal, 3);
            chunk.write(0, 3);
            chunk.write_op(OpCode::Const, 3);
            chunk.write(one as u8, 3);
            chunk.write_op(OpCode::Subtract, 3);
            chunk.write_op(OpCode::SetLocal, 3);
            chunk.write(0, 3);
            chunk.write_op(OpCode::Pop, 3);
            chunk.write_op(OpCode::GetLocal, 4);
            chunk.write(0, 4);
            chunk.write_op(OpCode::Const, 4);
            chunk.write(zero as u8, 4);
            chunk.write_op(OpCode::Greater, 4);
            chunk.write_op(OpCode::JumpIfFalse, 4);
            chunk.write(0, 4);
            chunk.write(4, 4);
            chunk.write_op(OpCode::Pop, 4);
            chunk.write_op(OpCode::Loop, 4);
            chunk.write(0, 4);
            chunk.write(23, 4);
            chunk.write_op(OpCode::Pop, 5);
            chunk.write_op(OpCode::Pop, 5);
            chunk.write_op(OpCode::Halt, 5);
        }
        Program::Array => {
            for n in [10, 20, 30] {
                let idx = chunk.add_constant(Value::Int(n));
                chunk.write_op(OpCode::Const, 1);
                chunk.write(idx as u8, 1);
            }
            chunk.write_op(OpCode::Array, 1);
            chunk.write(3, 1);
            chunk.write_op(OpCode::Print, 2);
            chunk.write_op(OpCode::Halt, 2);
        }
    }
    Ok(chunk)
}
