//! Line-oriented command shell.
//!
//! [`execute`] runs one command line against a filesystem and a [`ShellHost`] and
//! writes the result to any `fmt::Write` sink. On the target, [`run`] wraps it in a
//! prompt loop over the serial console as one of the scheduled processes.

use core::fmt::{self, Write};

use arrayvec::ArrayVec;

use crate::{
    constants::memory::PAGE_SIZE,
    filesys::{FileKind, RamFs},
    processes::process::{Pid, ProcessInfo},
};

pub const PROMPT: &str = "nos> ";
pub const MAX_ARGS: usize = 16;
pub const LINE_LEN: usize = 256;
/// `cat` streams files through a buffer of this size.
const CAT_CHUNK: usize = 64;

/// Kernel state the shell reports on.
pub trait ShellHost {
    fn free_pages(&self) -> usize;
    /// Visits every live process in table order, stopping at the first error.
    fn for_each_process(&self, f: &mut dyn FnMut(&ProcessInfo) -> fmt::Result) -> fmt::Result;
    fn current(&self) -> Option<Pid>;
    fn ticks(&self) -> u64;
}

/// Splits on spaces and tabs. Words past [`MAX_ARGS`] are dropped.
pub fn parse_args(line: &str) -> ArrayVec<&str, MAX_ARGS> {
    line.split([' ', '\t'])
        .filter(|word| !word.is_empty())
        .take(MAX_ARGS)
        .collect()
}

pub fn execute<const FILES: usize, const SIZE: usize>(
    line: &str,
    fs: &mut RamFs<FILES, SIZE>,
    host: &impl ShellHost,
    out: &mut impl Write,
) -> fmt::Result {
    let args = parse_args(line);
    let Some(&command) = args.first() else {
        return Ok(());
    };

    match command {
        "help" => help(out),
        "ls" => ls(fs, out),
        "cat" => cat(&args, fs, out),
        "ps" => ps(host, out),
        "mem" => mem(host, out),
        "echo" => writeln!(out, "{}", Joined(&args[1..])),
        "clear" => out.write_str("\x1b[2J\x1b[H"),
        "about" => about(out),
        "touch" => create(&args, FileKind::Regular, fs, out),
        "mkdir" => create(&args, FileKind::Directory, fs, out),
        "write" => write_file(&args, line, fs, out),
        "rm" => remove(&args, fs, out),
        "ticks" => writeln!(out, "Timer ticks: {}", host.ticks()),
        unknown => {
            writeln!(out, "Unknown command: {}", unknown)?;
            writeln!(out, "Type 'help' for available commands.")
        }
    }
}

/// Whatever follows the first `words` words of `line`, minus surrounding blanks.
fn text_after(line: &str, words: usize) -> &str {
    let mut rest = line;
    for _ in 0..words {
        rest = rest.trim_start_matches([' ', '\t']);
        let end = rest.find([' ', '\t']).unwrap_or(rest.len());
        rest = &rest[end..];
    }
    rest.trim_matches([' ', '\t'])
}

/// Words separated by single spaces.
struct Joined<'a>(&'a [&'a str]);

impl fmt::Display for Joined<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, word) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_char(' ')?;
            }
            f.write_str(word)?;
        }
        Ok(())
    }
}

#[inline(never)]
fn help(out: &mut impl Write) -> fmt::Result {
    const COMMANDS: [(&str, &str); 13] = [
        ("help", "Show this help message"),
        ("ls", "List files"),
        ("cat <file>", "Display file contents"),
        ("ps", "List processes"),
        ("mem", "Show memory info"),
        ("echo <msg>", "Print a message"),
        ("clear", "Clear screen"),
        ("about", "About NOS"),
        ("touch <file>", "Create an empty file"),
        ("mkdir <dir>", "Create a directory"),
        ("write <file> <text>", "Replace a file's contents"),
        ("rm <file>", "Remove a file"),
        ("ticks", "Show timer ticks since boot"),
    ];
    writeln!(out, "Available commands:")?;
    for (usage, summary) in COMMANDS {
        writeln!(out, "  {:<20} - {}", usage, summary)?;
    }
    Ok(())
}

#[inline(never)]
fn ls<const FILES: usize, const SIZE: usize>(
    fs: &RamFs<FILES, SIZE>,
    out: &mut impl Write,
) -> fmt::Result {
    writeln!(out, "Files:")?;
    writeln!(out, "  {:<20} {:<10} {:<10}", "Name", "Type", "Size")?;
    writeln!(out, "  ----------------------------------------")?;
    let mut count = 0;
    for file in fs.entries() {
        writeln!(out, "  {:<20} {:<10} {:<10}", file.name, file.kind, file.size)?;
        count += 1;
    }
    writeln!(out)?;
    writeln!(out, "  Total: {} files", count)
}

#[inline(never)]
fn cat<const FILES: usize, const SIZE: usize>(
    args: &[&str],
    fs: &RamFs<FILES, SIZE>,
    out: &mut impl Write,
) -> fmt::Result {
    let Some(&name) = args.get(1) else {
        return writeln!(out, "Usage: cat <filename>");
    };

    let mut chunk = [0u8; CAT_CHUNK];
    let mut offset = 0;
    let mut ends_with_newline = false;
    loop {
        let len = match fs.read_at(name, offset, &mut chunk) {
            Ok(0) => break,
            Ok(len) => len,
            Err(e) => return writeln!(out, "Failed to read file: {}: {}", name, e),
        };
        let bytes = &chunk[..len];
        let consumed = match core::str::from_utf8(bytes) {
            Ok(text) => {
                out.write_str(text)?;
                len
            }
            Err(e) => {
                let valid = e.valid_up_to();
                out.write_str(core::str::from_utf8(&bytes[..valid]).unwrap_or_default())?;
                match e.error_len() {
                    Some(bad) => {
                        out.write_char(char::REPLACEMENT_CHARACTER)?;
                        valid + bad
                    }
                    // A character split by the chunk edge is re-read with the next chunk.
                    None if valid > 0 => valid,
                    None => {
                        out.write_char(char::REPLACEMENT_CHARACTER)?;
                        len
                    }
                }
            }
        };
        ends_with_newline = bytes[consumed - 1] == b'\n';
        offset += consumed;
    }

    if !ends_with_newline {
        writeln!(out)?;
    }
    Ok(())
}

#[inline(never)]
fn ps(host: &impl ShellHost, out: &mut impl Write) -> fmt::Result {
    let current = host.current();
    writeln!(out, "Process list:")?;
    writeln!(out, "  PID  {:<16}  {:<9} Runtime", "Name", "State")?;
    writeln!(out, "  ----------------------------------------")?;
    host.for_each_process(&mut |info: &ProcessInfo| {
        let marker = if Some(info.pid) == current { '*' } else { ' ' };
        writeln!(
            out,
            "{} {:<4} {:<16}  {:<9} {}",
            marker, info.pid, info.name, info.state, info.runtime
        )
    })
}

fn mem(host: &impl ShellHost, out: &mut impl Write) -> fmt::Result {
    let free = host.free_pages();
    writeln!(out, "Memory information:")?;
    writeln!(out, "  Free pages: {}", free)?;
    writeln!(out, "  Free memory: {} KB", free * PAGE_SIZE as usize / 1024)
}

fn about(out: &mut impl Write) -> fmt::Result {
    out.write_str(
        "\n\
=================================\n  \
  NOS - Teaching Operating System\n  \
  RISC-V Edition\n\
=================================\n\n\
A simple operating system for educational purposes.\n\n\
Features:\n  \
  - RISC-V architecture support\n  \
  - Physical/Virtual memory management\n  \
  - Process scheduling (round-robin)\n  \
  - Simple in-memory file system\n  \
  - Basic shell with commands\n\n",
    )
}

fn create<const FILES: usize, const SIZE: usize>(
    args: &[&str],
    kind: FileKind,
    fs: &mut RamFs<FILES, SIZE>,
    out: &mut impl Write,
) -> fmt::Result {
    let Some(&name) = args.get(1) else {
        return writeln!(out, "Usage: {} <name>", args[0]);
    };
    match fs.create(name, kind) {
        Ok(()) => Ok(()),
        Err(e) => writeln!(out, "{}: {}: {}", args[0], name, e),
    }
}

#[inline(never)]
fn write_file<const FILES: usize, const SIZE: usize>(
    args: &[&str],
    line: &str,
    fs: &mut RamFs<FILES, SIZE>,
    out: &mut impl Write,
) -> fmt::Result {
    let Some(&name) = args.get(1) else {
        return writeln!(out, "Usage: write <file> <text...>");
    };
    if fs.find(name).is_none() {
        if let Err(e) = fs.create(name, FileKind::Regular) {
            return writeln!(out, "write: {}: {}", name, e);
        }
    }

    match fs.write(name, text_after(line, 2).as_bytes()) {
        Ok(n) => writeln!(out, "Wrote {} bytes to {}", n, name),
        Err(e) => writeln!(out, "write: {}: {}", name, e),
    }
}

fn remove<const FILES: usize, const SIZE: usize>(
    args: &[&str],
    fs: &mut RamFs<FILES, SIZE>,
    out: &mut impl Write,
) -> fmt::Result {
    let Some(&name) = args.get(1) else {
        return writeln!(out, "Usage: rm <file>");
    };
    match fs.delete(name) {
        Ok(()) => Ok(()),
        Err(e) => writeln!(out, "rm: {}: {}", name, e),
    }
}

#[cfg(target_arch = "riscv64")]
pub use console::run;

#[cfg(target_arch = "riscv64")]
mod console {
    use core::fmt;

    use arrayvec::ArrayString;

    use super::{execute, ShellHost, LINE_LEN, PROMPT};
    use crate::{
        devices::serial::try_read_byte,
        filesys::FILESYSTEM,
        interrupts,
        memory::frame_allocator::free_frame_count,
        processes::{
            process::{Pid, ProcessInfo},
            yield_now, SCHEDULER,
        },
        serial::_print,
        serial_print, serial_println,
    };

    struct KernelHost;

    impl ShellHost for KernelHost {
        fn free_pages(&self) -> usize {
            free_frame_count()
        }

        fn for_each_process(
            &self,
            f: &mut dyn FnMut(&ProcessInfo) -> fmt::Result,
        ) -> fmt::Result {
            SCHEDULER.lock().processes().try_for_each(|info| f(&info))
        }

        fn current(&self) -> Option<Pid> {
            SCHEDULER.lock().current().map(|pcb| pcb.pid)
        }

        fn ticks(&self) -> u64 {
            interrupts::ticks()
        }
    }

    /// Console output as a `fmt::Write` sink.
    struct Console;

    impl fmt::Write for Console {
        fn write_str(&mut self, s: &str) -> fmt::Result {
            _print(format_args!("{}", s));
            Ok(())
        }
    }

    /// Yields to the other processes until a byte arrives.
    fn read_byte() -> u8 {
        loop {
            if let Some(byte) = try_read_byte() {
                return byte;
            }
            yield_now();
        }
    }

    fn read_line(line: &mut ArrayString<LINE_LEN>) {
        line.clear();
        loop {
            match read_byte() {
                b'\r' | b'\n' => {
                    serial_println!();
                    return;
                }
                0x7f | 0x08 => {
                    if line.pop().is_some() {
                        serial_print!("\x08 \x08");
                    }
                }
                byte @ 0x20..=0x7e => {
                    if line.try_push(byte as char).is_ok() {
                        serial_print!("{}", byte as char);
                    }
                }
                _ => {}
            }
        }
    }

    /// Shell process entry point.
    pub fn run() -> ! {
        serial_println!("NOS Shell v1.0");
        serial_println!("Type 'help' for available commands.");
        serial_println!();

        let mut line = ArrayString::<LINE_LEN>::new();
        loop {
            serial_print!("{}", PROMPT);
            read_line(&mut line);
            let mut fs = FILESYSTEM.lock();
            // Console output cannot fail.
            let _ = execute(&line, &mut fs, &KernelHost, &mut Console);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        constants::processes::MAX_PROCESSES,
        filesys::seed,
        processes::process::{truncate_name, ProcessState},
    };

    struct FakeHost {
        free: usize,
        ticks: u64,
        processes: ArrayVec<ProcessInfo, MAX_PROCESSES>,
        current: Option<Pid>,
    }

    impl FakeHost {
        fn new() -> Self {
            let mut processes = ArrayVec::new();
            for (pid, name, state, runtime) in [
                (1, "idle", ProcessState::Ready, 4),
                (2, "test1", ProcessState::Ready, 3),
                (4, "shell", ProcessState::Running, 7),
            ] {
                processes.push(ProcessInfo {
                    pid,
                    name: truncate_name(name),
                    state,
                    runtime,
                    priority: 1,
                });
            }
            FakeHost {
                free: 1000,
                ticks: 1234,
                processes,
                current: Some(4),
            }
        }
    }

    impl ShellHost for FakeHost {
        fn free_pages(&self) -> usize {
            self.free
        }

        fn for_each_process(
            &self,
            f: &mut dyn FnMut(&ProcessInfo) -> fmt::Result,
        ) -> fmt::Result {
            self.processes.iter().try_for_each(f)
        }

        fn current(&self) -> Option<Pid> {
            self.current
        }

        fn ticks(&self) -> u64 {
            self.ticks
        }
    }

    type TestFs = RamFs<8, 2048>;

    fn seeded() -> TestFs {
        let mut fs = TestFs::new();
        seed(&mut fs).unwrap();
        fs
    }

    fn run(line: &str, fs: &mut TestFs) -> String {
        let mut out = String::new();
        execute(line, fs, &FakeHost::new(), &mut out).unwrap();
        out
    }

    #[test]
    fn arguments_split_on_spaces_and_tabs() {
        let args = parse_args("  write\tnotes.txt  hello   world ");
        assert_eq!(args.as_slice(), ["write", "notes.txt", "hello", "world"]);
        assert!(parse_args(" \t ").is_empty());
    }

    #[test]
    fn extra_arguments_are_dropped() {
        let line = "a ".repeat(MAX_ARGS + 4);
        assert_eq!(parse_args(&line).len(), MAX_ARGS);
    }

    #[test]
    fn empty_line_prints_nothing() {
        assert_eq!(run("   ", &mut seeded()), "");
    }

    #[test]
    fn unknown_command_hints_at_help() {
        assert_eq!(
            run("frobnicate now", &mut seeded()),
            "Unknown command: frobnicate\nType 'help' for available commands.\n"
        );
    }

    #[test]
    fn help_lists_every_command() {
        let out = run("help", &mut seeded());
        for command in [
            "help", "ls", "cat", "ps", "mem", "echo", "clear", "about", "touch", "mkdir", "write",
            "rm", "ticks",
        ] {
            assert!(out.contains(&format!("  {}", command)), "missing {}", command);
        }
    }

    #[test]
    fn echo_joins_words() {
        assert_eq!(run("echo  hello \t world", &mut seeded()), "hello world\n");
        assert_eq!(run("echo", &mut seeded()), "\n");
    }

    #[test]
    fn ls_shows_seeded_files() {
        let out = run("ls", &mut seeded());
        assert!(out.contains("README.txt"));
        assert!(out.contains("info.txt"));
        assert!(out.ends_with("  Total: 2 files\n"));
    }

    #[test]
    fn cat_prints_contents() {
        let out = run("cat info.txt", &mut seeded());
        assert!(out.starts_with("NOS supports:\n"));
        assert!(out.ends_with("- Basic shell\n"));
    }

    #[test]
    fn cat_reports_errors() {
        let mut fs = seeded();
        assert_eq!(run("cat", &mut fs), "Usage: cat <filename>\n");
        assert_eq!(
            run("cat missing", &mut fs),
            "Failed to read file: missing: File not found\n"
        );
    }

    #[test]
    fn cat_streams_whole_files() {
        let mut fs = seeded();
        let contents: String = (0..1500).map(|i| char::from(b'a' + (i % 26) as u8)).collect();
        fs.create("big", FileKind::Regular).unwrap();
        fs.write("big", contents.as_bytes()).unwrap();

        assert_eq!(run("cat big", &mut fs), contents + "\n");
    }

    #[test]
    fn cat_keeps_characters_split_across_chunks() {
        let mut fs = seeded();
        let contents = format!("a{}\n", "é".repeat(100));
        fs.create("utf8", FileKind::Regular).unwrap();
        fs.write("utf8", contents.as_bytes()).unwrap();

        assert_eq!(run("cat utf8", &mut fs), contents);
    }

    #[test]
    fn cat_replaces_invalid_bytes() {
        let mut fs = seeded();
        fs.create("bin", FileKind::Regular).unwrap();
        fs.write("bin", &[b'a', 0xff, b'b']).unwrap();
        assert_eq!(run("cat bin", &mut fs), "a\u{fffd}b\n");

        fs.write("bin", &[b'a', 0xc3]).unwrap();
        assert_eq!(run("cat bin", &mut fs), "a\u{fffd}\n");

        fs.write("bin", &[]).unwrap();
        assert_eq!(run("cat bin", &mut fs), "\n");
    }

    #[test]
    fn write_creates_and_replaces() {
        let mut fs = seeded();
        assert_eq!(run("write notes hello there", &mut fs), "Wrote 11 bytes to notes\n");
        assert_eq!(run("cat notes", &mut fs), "hello there\n");
        run("write notes bye", &mut fs);
        assert_eq!(run("cat notes", &mut fs), "bye\n");
        assert_eq!(run("write notes", &mut fs), "Wrote 0 bytes to notes\n");
    }

    #[test]
    fn write_keeps_spacing_inside_the_text() {
        let mut fs = seeded();
        run(" write\tnotes  a  b\tc ", &mut fs);
        assert_eq!(run("cat notes", &mut fs), "a  b\tc\n");
    }

    #[test]
    fn touch_mkdir_and_rm() {
        let mut fs = seeded();
        assert_eq!(run("touch a", &mut fs), "");
        assert_eq!(run("mkdir d", &mut fs), "");
        assert_eq!(run("touch a", &mut fs), "touch: a: File already exists\n");
        assert_eq!(run("write d text", &mut fs), "write: d: Not a regular file\n");
        assert!(run("ls", &mut fs).contains("  Total: 4 files"));

        assert_eq!(run("rm a", &mut fs), "");
        assert_eq!(run("rm a", &mut fs), "rm: a: File not found\n");
        assert_eq!(run("rm", &mut fs), "Usage: rm <file>\n");
        assert_eq!(run("mkdir", &mut fs), "Usage: mkdir <name>\n");
    }

    #[test]
    fn ps_lists_every_process() {
        let out = run("ps", &mut seeded());
        assert!(out.contains("idle"));
        assert!(out.contains("test1"));
        assert!(out.lines().any(|l| l.starts_with("* 4") && l.contains("RUNNING")));
        assert_eq!(out.lines().count(), 3 + 3);
    }

    #[test]
    fn mem_reports_pages_and_kib() {
        assert_eq!(
            run("mem", &mut seeded()),
            "Memory information:\n  Free pages: 1000\n  Free memory: 4000 KB\n"
        );
    }

    #[test]
    fn ticks_and_clear() {
        let mut fs = seeded();
        assert_eq!(run("ticks", &mut fs), "Timer ticks: 1234\n");
        assert_eq!(run("clear", &mut fs), "\x1b[2J\x1b[H");
    }

    #[test]
    fn about_names_the_system() {
        assert!(run("about", &mut seeded()).contains("NOS - Teaching Operating System"));
    }

    /// Output sink that tracks how far below `base` the stack grew by the time
    /// output reached it.
    struct StackGauge {
        base: usize,
        deepest: usize,
        text: String,
    }

    impl Write for StackGauge {
        fn write_str(&mut self, s: &str) -> fmt::Result {
            let here = 0u8;
            let addr = std::hint::black_box(&here) as *const u8 as usize;
            self.deepest = self.deepest.max(self.base.saturating_sub(addr));
            self.text.push_str(s);
            Ok(())
        }
    }

    #[test]
    fn commands_fit_in_a_fraction_of_a_process_stack() {
        // The shell shares its single stack page with nested trap frames.
        let budget = if cfg!(debug_assertions) {
            PAGE_SIZE as usize
        } else {
            PAGE_SIZE as usize / 2
        };
        let mut fs = seeded();
        fs.create("big", FileKind::Regular).unwrap();
        fs.write("big", &[b'x'; 2000]).unwrap();
        let host = FakeHost::new();

        for line in [
            "help", "ls", "cat big", "cat README.txt", "ps", "mem", "echo a b c", "about",
            "write notes some text here", "touch t", "rm t", "ticks", "nope",
        ] {
            let top = 0u8;
            let mut gauge = StackGauge {
                base: std::hint::black_box(&top) as *const u8 as usize,
                deepest: 0,
                text: String::new(),
            };
            execute(line, &mut fs, &host, &mut gauge).unwrap();
            assert!(
                gauge.deepest < budget,
                "`{}` used {} bytes of stack",
                line,
                gauge.deepest
            );
        }
    }
}
