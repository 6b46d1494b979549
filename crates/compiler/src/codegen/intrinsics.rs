//! Intrinsic library (C9)
//!
//! Declares the unconditional externs, synthesizes the file-handling
//! intrinsic bodies (`assignfile`/`reset`/`rewrite`/`closefile`/the two
//! `readln` overloads), and lowers the `{writeln, write, ..., chr}`
//! system-call table. Platform split (Win32 vs POSIX) selects the
//! format-string/newline/assert-symbol family, the same kind of
//! compile-time target switch a cross-compiling backend needs elsewhere.

use super::error::CodeGenError;
use super::state::CodeGen;
use crate::ast::{Expr, Unit};
use crate::types::Type;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    Posix,
    Win32,
}

impl Platform {
    pub fn host() -> Self {
        if cfg!(windows) {
            Platform::Win32
        } else {
            Platform::Posix
        }
    }

    pub fn newline(&self) -> &'static str {
        match self {
            Platform::Posix => "\\0A",
            Platform::Win32 => "\\0D\\0A",
        }
    }

    pub fn assert_fail_symbol(&self) -> &'static str {
        match self {
            Platform::Posix => "__assert_fail",
            Platform::Win32 => "_assert",
        }
    }

    pub fn int_format(&self) -> &'static str {
        match self {
            Platform::Posix => "%ld",
            Platform::Win32 => "%lli",
        }
    }
}

pub const SYSTEM_CALLS: &[&str] = &[
    "writeln", "write", "printf", "exit", "halt", "low", "high", "setlength", "length", "pchar",
    "new", "strdispose", "assert", "assignfile", "readln", "closefile", "reset", "rewrite", "ord",
    "chr",
];

pub fn is_system_call(name: &str) -> bool {
    SYSTEM_CALLS.iter().any(|s| s.eq_ignore_ascii_case(name))
}

pub fn emit_externs(cg: &mut CodeGen, platform: Platform) {
    cg.output.push_str("declare void @exit(i32)\n");
    cg.output.push_str("declare i32 @fflush(ptr)\n");
    cg.output.push_str("declare ptr @fopen(ptr, ptr)\n");
    cg.output.push_str("declare i32 @fclose(ptr)\n");
    cg.output.push_str("declare i8 @fgetc(ptr)\n");
    cg.output.push_str("declare i64 @fwrite(ptr, i64, i64, ptr)\n");
    cg.output
        .push_str("declare ptr @realloc(ptr, i64) argmemonly willreturn nofree\n");
    cg.output.push_str("declare ptr @malloc(i64)\n");
    cg.output.push_str("declare void @free(ptr)\n");
    cg.output.push_str("declare i32 @printf(ptr, ...)\n");
    cg.output.push_str("declare i32 @fprintf(ptr, ptr, ...)\n");
    cg.output.push_str("declare i32 @comparestr(ptr, ptr)\n");
    match platform {
        Platform::Posix => {
            cg.output
                .push_str("declare void @__assert_fail(ptr, ptr, i32, ptr)\n");
        }
        Platform::Win32 => {
            cg.output.push_str("declare void @_assert(ptr, ptr, i32)\n");
            cg.output.push_str("declare ptr @__acrt_iob_func(i32)\n");
        }
    }
}

/// Globals + synthesized bodies that belong in the module preamble.
pub fn emit_preamble_globals(cg: &mut CodeGen, platform: Platform) {
    match platform {
        Platform::Posix => {
            cg.output.push_str("@stdin = external global ptr\n");
            cg.output.push_str("@stdout = external global ptr\n");
            cg.output.push_str("@stderr = external global ptr\n");
        }
        Platform::Win32 => {
            cg.output.push_str("@stdin = global ptr null\n");
            cg.output.push_str("@stdout = global ptr null\n");
            cg.output.push_str("@stderr = global ptr null\n");
        }
    }
}

/// Synthesized bodies for `assignfile`/`reset`/`rewrite`/`closefile`/the
/// two `readln` overloads, emitted once as ordinary IR functions so the
/// normal call path can invoke them like any user function.
pub fn emit_intrinsic_bodies(cg: &mut CodeGen) {
    let string_ir = Type::String.generate_ir_type();
    cg.output.push_str(&format!(
        "define void @assignfile(ptr %file, {string_ir} %name_str) {{\n\
         entry:\n\
         \u{20}\u{20}%namelen = extractvalue {string_ir} %name_str, 1\n\
         \u{20}\u{20}%namedata = extractvalue {string_ir} %name_str, 2\n\
         \u{20}\u{20}%buf = call ptr @malloc(i64 %namelen)\n\
         \u{20}\u{20}call void @llvm.memcpy.p0.p0.i64(ptr %buf, ptr %namedata, i64 %namelen, i1 false)\n\
         \u{20}\u{20}%name_field = getelementptr inbounds {{ ptr, ptr, i1 }}, ptr %file, i32 0, i32 0\n\
         \u{20}\u{20}store ptr %buf, ptr %name_field\n\
         \u{20}\u{20}ret void\n\
         }}\n"
    ));
    cg.output.push_str(
        "define void @reset(ptr %file) {\n\
         entry:\n\
         \u{20}\u{20}%name_field = getelementptr inbounds { ptr, ptr, i1 }, ptr %file, i32 0, i32 0\n\
         \u{20}\u{20}%name = load ptr, ptr %name_field\n\
         \u{20}\u{20}%mode = getelementptr inbounds [3 x i8], ptr @.mode.r, i32 0, i32 0\n\
         \u{20}\u{20}%handle = call ptr @fopen(ptr %name, ptr %mode)\n\
         \u{20}\u{20}%handle_field = getelementptr inbounds { ptr, ptr, i1 }, ptr %file, i32 0, i32 1\n\
         \u{20}\u{20}store ptr %handle, ptr %handle_field\n\
         \u{20}\u{20}ret void\n\
         }\n",
    );
    cg.output.push_str(
        "define void @rewrite(ptr %file) {\n\
         entry:\n\
         \u{20}\u{20}%name_field = getelementptr inbounds { ptr, ptr, i1 }, ptr %file, i32 0, i32 0\n\
         \u{20}\u{20}%name = load ptr, ptr %name_field\n\
         \u{20}\u{20}%mode = getelementptr inbounds [3 x i8], ptr @.mode.w, i32 0, i32 0\n\
         \u{20}\u{20}%handle = call ptr @fopen(ptr %name, ptr %mode)\n\
         \u{20}\u{20}%handle_field = getelementptr inbounds { ptr, ptr, i1 }, ptr %file, i32 0, i32 1\n\
         \u{20}\u{20}store ptr %handle, ptr %handle_field\n\
         \u{20}\u{20}ret void\n\
         }\n",
    );
    cg.output.push_str(
        "define void @closefile(ptr %file) {\n\
         entry:\n\
         \u{20}\u{20}%handle_field = getelementptr inbounds { ptr, ptr, i1 }, ptr %file, i32 0, i32 1\n\
         \u{20}\u{20}%handle = load ptr, ptr %handle_field\n\
         \u{20}\u{20}%isnull = icmp eq ptr %handle, null\n\
         \u{20}\u{20}br i1 %isnull, label %skip, label %doclose\n\
         doclose:\n\
         \u{20}\u{20}call i32 @fclose(ptr %handle)\n\
         \u{20}\u{20}br label %skip\n\
         skip:\n\
         \u{20}\u{20}ret void\n\
         }\n",
    );
    cg.output.push_str(
        "@.mode.r = private constant [3 x i8] c\"r+\\00\"\n\
         @.mode.w = private constant [3 x i8] c\"w+\\00\"\n",
    );
    cg.output.push_str(&format!(
        "define {string_ir} @char_to_string(i8 %ch) {{\n\
         entry:\n\
         \u{20}\u{20}%buf = call ptr @malloc(i64 2)\n\
         \u{20}\u{20}store i8 %ch, ptr %buf\n\
         \u{20}\u{20}%tail = getelementptr inbounds i8, ptr %buf, i64 1\n\
         \u{20}\u{20}store i8 0, ptr %tail\n\
         \u{20}\u{20}%t1 = insertvalue {string_ir} undef, i64 0, 0\n\
         \u{20}\u{20}%t2 = insertvalue {string_ir} %t1, i64 2, 1\n\
         \u{20}\u{20}%t3 = insertvalue {string_ir} %t2, ptr %buf, 2\n\
         \u{20}\u{20}ret {string_ir} %t3\n\
         }}\n"
    ));
}

/// Lowers one of the built-in system-call names; resolved by
/// case-insensitive name, not by signature.
pub fn lower_system_call(
    cg: &mut CodeGen,
    unit: &Unit,
    platform: Platform,
    name: &str,
    args: &[Expr],
) -> Result<(String, Type), CodeGenError> {
    use super::statements::{lower_expr, lower_lvalue};

    match name.to_lowercase().as_str() {
        "writeln" | "write" => {
            for arg in args {
                let (val, ty) = lower_expr(cg, unit, arg)?;
                emit_print(cg, &val, &ty)?;
            }
            if name.eq_ignore_ascii_case("writeln") {
                cg.output
                    .push_str("  call i32 (ptr, ...) @printf(ptr @.fmt.nl, ptr @.nlbytes)\n");
            }
            Ok(("0".to_string(), Type::Unknown))
        }
        "length" => {
            let (val, ty) = lower_expr(cg, unit, &args[0])?;
            let temp = cg.new_temp();
            match &ty {
                Type::String => {
                    cg.output
                        .push_str(&format!("  {temp} = extractvalue {} {val}, 1\n", ty.generate_ir_type()));
                }
                Type::DynArray { .. } => {
                    cg.output
                        .push_str(&format!("  {temp} = extractvalue {} {val}, 0\n", ty.generate_ir_type()));
                }
                Type::FixedArray { .. } => {
                    let n = ty.generate_length_value();
                    return Ok((n, Type::Integer { width: 32 }));
                }
                _ => return Err(CodeGenError::Logic(format!("length() not supported for {}", ty.type_name()))),
            }
            Ok((temp, Type::Integer { width: 32 }))
        }
        "low" => {
            let (_, ty) = lower_expr(cg, unit, &args[0])?;
            match &ty {
                Type::DynArray { .. } | Type::String => Ok(("0".to_string(), Type::Integer { width: 32 })),
                _ => Ok((ty.generate_low_value(), Type::Integer { width: 32 })),
            }
        }
        "high" => {
            let (ptr, ty) = lower_lvalue(cg, unit, &args[0])?;
            match &ty {
                Type::DynArray { .. } => {
                    let len_field = cg.new_temp();
                    cg.output.push_str(&format!(
                        "  {len_field} = getelementptr inbounds {}, ptr {ptr}, i32 0, i32 0\n",
                        ty.generate_ir_type()
                    ));
                    let len = cg.new_temp();
                    cg.output.push_str(&format!("  {len} = load i64, ptr {len_field}\n"));
                    let high = cg.new_temp();
                    cg.output.push_str(&format!("  {high} = sub i64 {len}, 1\n"));
                    Ok((high, Type::Integer { width: 32 }))
                }
                Type::String => {
                    let len_field = cg.new_temp();
                    cg.output.push_str(&format!(
                        "  {len_field} = getelementptr inbounds {}, ptr {ptr}, i32 0, i32 1\n",
                        ty.generate_ir_type()
                    ));
                    let len = cg.new_temp();
                    cg.output.push_str(&format!("  {len} = load i64, ptr {len_field}\n"));
                    let high = cg.new_temp();
                    cg.output.push_str(&format!("  {high} = sub i64 {len}, 2\n"));
                    Ok((high, Type::Integer { width: 32 }))
                }
                _ => Ok((ty.generate_high_value(), Type::Integer { width: 32 })),
            }
        }
        "setlength" => {
            let (ptr, ty) = lower_lvalue(cg, unit, &args[0])?;
            let (new_len, _) = lower_expr(cg, unit, &args[1])?;
            let element = match &ty {
                Type::DynArray { element } => (**element).clone(),
                Type::String => Type::Character,
                _ => return Err(CodeGenError::Logic("setlength() target is not resizable".to_string())),
            };
            let elem_ir = element.generate_ir_type();
            let (len_idx, data_idx) = match &ty {
                Type::String => (1, 2),
                _ => (0, 1),
            };
            let data_field = cg.new_temp();
            cg.output.push_str(&format!(
                "  {data_field} = getelementptr inbounds {}, ptr {ptr}, i32 0, i32 {data_idx}\n",
                ty.generate_ir_type()
            ));
            let old_data = cg.new_temp();
            cg.output.push_str(&format!("  {old_data} = load ptr, ptr {data_field}\n"));
            let elem_size_ptr = cg.new_temp();
            cg.output.push_str(&format!(
                "  {elem_size_ptr} = getelementptr {elem_ir}, ptr null, i64 1\n"
            ));
            let elem_size = cg.new_temp();
            cg.output.push_str(&format!("  {elem_size} = ptrtoint ptr {elem_size_ptr} to i64\n"));
            let byte_len = cg.new_temp();
            cg.output.push_str(&format!("  {byte_len} = mul i64 {new_len}, {elem_size}\n"));
            let new_data = cg.new_temp();
            cg.output.push_str(&format!("  {new_data} = call ptr @realloc(ptr {old_data}, i64 {byte_len})\n"));
            cg.output.push_str(&format!("  store ptr {new_data}, ptr {data_field}\n"));
            let len_field = cg.new_temp();
            cg.output.push_str(&format!(
                "  {len_field} = getelementptr inbounds {}, ptr {ptr}, i32 0, i32 {len_idx}\n",
                ty.generate_ir_type()
            ));
            cg.output.push_str(&format!("  store i64 {new_len}, ptr {len_field}\n"));
            Ok(("0".to_string(), Type::Unknown))
        }
        "exit" => {
            if let Some(arg) = args.first() {
                let (val, _) = lower_expr(cg, unit, arg)?;
                let ret_ty = cg.current_ref().return_type.clone();
                if let Some(ret_ty) = ret_ty {
                    cg.output.push_str(&format!("  ret {} {val}\n", ret_ty.generate_ir_type()));
                } else {
                    cg.output.push_str("  ret void\n");
                }
            } else {
                cg.output.push_str("  ret void\n");
            }
            cg.current_mut().explicit_return = true;
            Ok(("0".to_string(), Type::Unknown))
        }
        "halt" => {
            let code = if let Some(arg) = args.first() {
                lower_expr(cg, unit, arg)?.0
            } else {
                "0".to_string()
            };
            cg.output.push_str(&format!("  call void @exit(i32 {code})\n"));
            cg.output.push_str("  unreachable\n");
            Ok(("0".to_string(), Type::Unknown))
        }
        "assert" => {
            let (cond, _) = lower_expr(cg, unit, &args[0])?;
            let fail_label = cg.new_label("assert_fail");
            let ok_label = cg.new_label("assert_ok");
            let negated = cg.new_temp();
            cg.output.push_str(&format!("  {negated} = xor i1 {cond}, 1\n"));
            cg.output.push_str(&format!("  br i1 {negated}, label %{fail_label}, label %{ok_label}\n"));
            cg.output.push_str(&format!("{fail_label}:\n"));
            cg.output
                .push_str(&format!("  call void @{}(ptr @.assertmsg, ptr @.file, i32 0)\n", platform.assert_fail_symbol()));
            cg.output.push_str("  unreachable\n");
            cg.output.push_str(&format!("{ok_label}:\n"));
            Ok(("0".to_string(), Type::Unknown))
        }
        "pchar" => {
            let (val, _) = lower_expr(cg, unit, &args[0])?;
            let temp = cg.new_temp();
            cg.output
                .push_str(&format!("  {temp} = extractvalue {} {val}, 2\n", Type::String.generate_ir_type()));
            Ok((temp, Type::Pointer { base: Some(Box::new(Type::Character)) }))
        }
        "ord" | "chr" => lower_expr(cg, unit, &args[0]),
        "new" => {
            let (_ptr, ty) = lower_lvalue(cg, unit, &args[0])?;
            let pointee = match &ty {
                Type::Pointer { base: Some(b) } => (**b).clone(),
                other => other.clone(),
            };
            let alloc = cg.new_temp();
            cg.output.push_str(&format!("  {alloc} = alloca {}\n", pointee.generate_ir_type()));
            Ok((alloc, Type::Pointer { base: Some(Box::new(pointee)) }))
        }
        "strdispose" => {
            let (val, _) = lower_expr(cg, unit, &args[0])?;
            cg.output.push_str(&format!("  call void @free(ptr {val})\n"));
            Ok(("0".to_string(), Type::Unknown))
        }
        "assignfile" => {
            let (file_ptr, _) = lower_lvalue(cg, unit, &args[0])?;
            let (name_val, name_ty) = lower_expr(cg, unit, &args[1])?;
            cg.output.push_str(&format!(
                "  call void @assignfile(ptr {file_ptr}, {} {name_val})\n",
                name_ty.generate_ir_type()
            ));
            Ok(("0".to_string(), Type::Unknown))
        }
        "reset" | "rewrite" | "closefile" => {
            let (file_ptr, _) = lower_lvalue(cg, unit, &args[0])?;
            cg.output
                .push_str(&format!("  call void @{}(ptr {file_ptr})\n", name.to_lowercase()));
            Ok(("0".to_string(), Type::Unknown))
        }
        "readln" | "printf" => {
            let mut rendered = Vec::new();
            for a in args {
                let (val, ty) = lower_expr(cg, unit, a)?;
                rendered.push(format!("{} {val}", ty.generate_ir_type()));
            }
            cg.output
                .push_str(&format!("  call void @{}({})\n", name.to_lowercase(), rendered.join(", ")));
            Ok(("0".to_string(), Type::Unknown))
        }
        other => Err(CodeGenError::Logic(format!("unrecognized system call '{other}'"))),
    }
}

fn emit_print(cg: &mut CodeGen, val: &str, ty: &Type) -> Result<(), CodeGenError> {
    match ty {
        Type::String => {
            let data = cg.new_temp();
            cg.output
                .push_str(&format!("  {data} = extractvalue {} {val}, 2\n", Type::String.generate_ir_type()));
            cg.output
                .push_str(&format!("  call i32 (ptr, ...) @printf(ptr @.fmt.s, ptr {data})\n"));
        }
        Type::Integer { width } => {
            let widened = if *width == 64 {
                val.to_string()
            } else {
                let t = cg.new_temp();
                cg.output.push_str(&format!("  {t} = sext i{width} {val} to i64\n"));
                t
            };
            cg.output
                .push_str(&format!("  call i32 (ptr, ...) @printf(ptr @.fmt.i, i64 {widened})\n"));
        }
        Type::ValueRange { .. } | Type::Enum { .. } => {
            cg.output
                .push_str(&format!("  call i32 (ptr, ...) @printf(ptr @.fmt.i, i64 {val})\n"));
        }
        Type::Double | Type::Single => {
            cg.output
                .push_str(&format!("  call i32 (ptr, ...) @printf(ptr @.fmt.f, double {val})\n"));
        }
        Type::Character => {
            cg.output
                .push_str(&format!("  call i32 (ptr, ...) @printf(ptr @.fmt.c, i8 {val})\n"));
        }
        _ => return Err(CodeGenError::Logic(format!("write/writeln: unsupported argument type {}", ty.type_name()))),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn posix_platform_uses_posix_assert_symbol() {
        assert_eq!(Platform::Posix.assert_fail_symbol(), "__assert_fail");
    }

    #[test]
    fn win32_platform_uses_crlf_newline() {
        assert_eq!(Platform::Win32.newline(), "\\0D\\0A");
    }
}
