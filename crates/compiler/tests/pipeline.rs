//! End-to-end tests: source text in, LLVM IR text out, through the real
//! `compile_file` entry point (lex -> macros -> parse -> typecheck -> codegen).

use pascalc::config::CompilerConfig;
use std::io::Write;
use std::path::{Path, PathBuf};

fn write_source(dir: &Path, name: &str, src: &str) -> PathBuf {
    let path = dir.join(name);
    let mut f = std::fs::File::create(&path).unwrap();
    f.write_all(src.as_bytes()).unwrap();
    path
}

fn compile(src: &str) -> String {
    let dir = tempfile::tempdir().unwrap();
    let path = write_source(dir.path(), "p.pas", src);
    let config = CompilerConfig::default();
    match pascalc::compile_file(&path, &config) {
        Ok(out) => out.ir,
        Err(failure) => panic!("{}", failure.diagnostics.render(&failure.source_map)),
    }
}

#[test]
fn hello_world_prints_a_string_literal() {
    let ir = compile("program hello; begin writeln('Hello, world!'); end.");
    assert!(ir.contains("@main"));
    assert!(ir.contains("declare i32 @printf(ptr, ...)"));
    assert!(ir.contains("Hello, world!"));
}

#[test]
fn for_loop_sum_lowers_to_a_counted_loop() {
    let ir = compile(
        "program s; var i,total:integer; begin total:=0; for i:=1 to 10 do total:=total+i; writeln(total); end.",
    );
    assert!(ir.contains("for_head"));
    assert!(ir.contains("for_body"));
    assert!(ir.contains("for_step"));
    assert!(ir.contains("for_end"));
    assert!(ir.contains("icmp sle"));
    assert!(ir.contains("add i32"));
}

#[test]
fn fixed_array_out_of_range_index_emits_a_guard() {
    let ir = compile("program r; var a:array[1..3] of integer; i:integer; begin i:=4; a[i]:=0; end.");
    assert!(ir.contains("range_fail"));
    assert!(ir.contains("range_ok"));
    assert!(ir.contains("@__assert_fail") || ir.contains("@_assert"));
    assert!(ir.contains("index out of range for expression: a[i]"));
    // the check must run on the original index, against the declared 1..3
    // bounds, not the lo-adjusted (0-based) one
    assert!(ir.contains("icmp sge i64 %t3, 1"));
    assert!(ir.contains("icmp sle i64 %t3, 3"));
}

#[test]
fn dynamic_array_grow_reallocates_and_reads_back() {
    let ir = compile(
        "program d; var a:array of integer; begin setlength(a,3); a[0]:=10; a[1]:=20; a[2]:=30; writeln(length(a),' ',a[0]+a[1]+a[2]); end.",
    );
    assert!(ir.contains("@realloc"));
    assert!(ir.contains("extractvalue"));
    // the high bound comes from a runtime length load, not a placeholder
    // string spliced into the icmp operand
    assert!(ir.contains("load i64, ptr %t"));
    assert!(ir.contains("index out of range for expression: a[0]"));
    assert!(!ir.contains("%length"));
}

#[test]
fn string_index_is_range_checked_against_its_runtime_length() {
    let ir = compile(
        "program s; var t:string; i:integer; begin t:='hi'; i:=5; writeln(t[i]); end.",
    );
    assert!(ir.contains("range_fail"));
    assert!(ir.contains("index out of range for expression: t[i]"));
}

#[test]
fn assignfile_call_site_matches_its_synthesized_signature() {
    let ir = compile("program f; var h:file; begin assignfile(h,'out.txt'); rewrite(h); closefile(h); end.");
    assert!(ir.contains("define void @assignfile(ptr %file, { i64, i64, i8* } %name_str)"));
    assert!(ir.contains("call void @assignfile(ptr %t1, { i64, i64, i8* } %t5)"));
    assert!(ir.contains("call void @rewrite(ptr %t1)"));
    assert!(ir.contains("call void @closefile(ptr %t1)"));
}

#[test]
fn case_over_strings_dispatches_through_comparestr() {
    let ir = compile(
        "program c; var s:string; begin s:='b'; case s of 'a': writeln(1); 'b': writeln(2); else writeln(3); end; end.",
    );
    assert!(ir.contains("@comparestr"));
    assert!(ir.contains("case_arm"));
    assert!(ir.contains("case_else"));
    assert!(ir.contains("case_end"));
}

#[test]
fn unit_import_resolves_a_call_into_the_imported_function() {
    let dir = tempfile::tempdir().unwrap();
    write_source(
        dir.path(),
        "m.pas",
        "unit m; interface function inc(x:integer):integer; implementation function inc(x:integer):integer; begin inc:=x+1; end; end.",
    );
    let prog = write_source(dir.path(), "p.pas", "program p; uses m; begin writeln(inc(41)); end.");

    let config = CompilerConfig::default();
    let out = pascalc::compile_file(&prog, &config)
        .unwrap_or_else(|failure| panic!("{}", failure.diagnostics.render(&failure.source_map)));

    assert!(out.ir.contains("call i32 @inc"));
    assert!(out.ir.contains("define i32 @inc"));
}
