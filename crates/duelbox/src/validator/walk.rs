//! Recursive syntax-tree walk for the capability policy
//!
//! Every statement and expression kind is matched explicitly so that new
//! syntactic positions cannot slip past the policy unexamined.

use rustpython_parser::ast::{
    Arg, ArgWithDefault, Arguments, Comprehension, ExceptHandler, Expr, Keyword, MatchCase,
    Pattern, Stmt, WithItem,
};

use crate::validator::{RejectReason, denied_attribute, denied_builtin, denied_module};

pub(crate) fn check_stmt(stmt: &Stmt) -> Result<(), RejectReason> {
    match stmt {
        Stmt::Import(import) => {
            for alias in &import.names {
                if let Some(module) = denied_module(alias.name.as_str()) {
                    return Err(RejectReason::DeniedImport(module.to_string()));
                }
            }
            Ok(())
        }
        Stmt::ImportFrom(import) => {
            if import.level.as_ref().map_or(0, |l| l.to_u32()) > 0 {
                return Err(RejectReason::RelativeImport);
            }
            match import.module.as_ref() {
                Some(module) => {
                    if let Some(denied) = denied_module(module.as_str()) {
                        return Err(RejectReason::DeniedImport(denied.to_string()));
                    }
                    Ok(())
                }
                // `from import ...` without a module only parses as relative
                None => Err(RejectReason::RelativeImport),
            }
        }
        Stmt::FunctionDef(def) => {
            check_arguments(&def.args)?;
            check_exprs(&def.decorator_list)?;
            check_opt_expr(def.returns.as_deref())?;
            check_stmts(&def.body)
        }
        Stmt::AsyncFunctionDef(def) => {
            check_arguments(&def.args)?;
            check_exprs(&def.decorator_list)?;
            check_opt_expr(def.returns.as_deref())?;
            check_stmts(&def.body)
        }
        Stmt::ClassDef(def) => {
            check_exprs(&def.bases)?;
            check_keywords(&def.keywords)?;
            check_exprs(&def.decorator_list)?;
            check_stmts(&def.body)
        }
        Stmt::Return(ret) => check_opt_expr(ret.value.as_deref()),
        Stmt::Delete(del) => check_exprs(&del.targets),
        Stmt::Assign(assign) => {
            check_exprs(&assign.targets)?;
            check_expr(&assign.value)
        }
        Stmt::AugAssign(assign) => {
            check_expr(&assign.target)?;
            check_expr(&assign.value)
        }
        Stmt::AnnAssign(assign) => {
            check_expr(&assign.target)?;
            check_expr(&assign.annotation)?;
            check_opt_expr(assign.value.as_deref())
        }
        Stmt::TypeAlias(alias) => {
            check_expr(&alias.name)?;
            check_expr(&alias.value)
        }
        Stmt::For(stmt) => {
            check_expr(&stmt.target)?;
            check_expr(&stmt.iter)?;
            check_stmts(&stmt.body)?;
            check_stmts(&stmt.orelse)
        }
        Stmt::AsyncFor(stmt) => {
            check_expr(&stmt.target)?;
            check_expr(&stmt.iter)?;
            check_stmts(&stmt.body)?;
            check_stmts(&stmt.orelse)
        }
        Stmt::While(stmt) => {
            check_expr(&stmt.test)?;
            check_stmts(&stmt.body)?;
            check_stmts(&stmt.orelse)
        }
        Stmt::If(stmt) => {
            check_expr(&stmt.test)?;
            check_stmts(&stmt.body)?;
            check_stmts(&stmt.orelse)
        }
        Stmt::With(stmt) => {
            check_with_items(&stmt.items)?;
            check_stmts(&stmt.body)
        }
        Stmt::AsyncWith(stmt) => {
            check_with_items(&stmt.items)?;
            check_stmts(&stmt.body)
        }
        Stmt::Match(stmt) => {
            check_expr(&stmt.subject)?;
            for case in &stmt.cases {
                check_match_case(case)?;
            }
            Ok(())
        }
        Stmt::Raise(stmt) => {
            check_opt_expr(stmt.exc.as_deref())?;
            check_opt_expr(stmt.cause.as_deref())
        }
        Stmt::Try(stmt) => {
            check_stmts(&stmt.body)?;
            for handler in &stmt.handlers {
                check_except_handler(handler)?;
            }
            check_stmts(&stmt.orelse)?;
            check_stmts(&stmt.finalbody)
        }
        Stmt::TryStar(stmt) => {
            check_stmts(&stmt.body)?;
            for handler in &stmt.handlers {
                check_except_handler(handler)?;
            }
            check_stmts(&stmt.orelse)?;
            check_stmts(&stmt.finalbody)
        }
        Stmt::Assert(stmt) => {
            check_expr(&stmt.test)?;
            check_opt_expr(stmt.msg.as_deref())
        }
        Stmt::Expr(stmt) => check_expr(&stmt.value),
        Stmt::Global(_) | Stmt::Nonlocal(_) | Stmt::Pass(_) | Stmt::Break(_)
        | Stmt::Continue(_) => Ok(()),
    }
}

pub(crate) fn check_expr(expr: &Expr) -> Result<(), RejectReason> {
    match expr {
        Expr::Call(call) => {
            // Deny calls that reach a dynamic-execution builtin either by
            // bare name or through an attribute chain
            match call.func.as_ref() {
                Expr::Name(name) => {
                    if let Some(builtin) = denied_builtin(name.id.as_str()) {
                        return Err(RejectReason::DeniedCall(builtin.to_string()));
                    }
                }
                Expr::Attribute(attr) => {
                    if let Some(builtin) = denied_builtin(attr.attr.as_str()) {
                        return Err(RejectReason::DeniedCall(builtin.to_string()));
                    }
                }
                _ => {}
            }
            check_expr(&call.func)?;
            check_exprs(&call.args)?;
            check_keywords(&call.keywords)
        }
        Expr::Attribute(attr) => {
            if let Some(denied) = denied_attribute(attr.attr.as_str()) {
                return Err(RejectReason::DeniedAttribute(denied.to_string()));
            }
            check_expr(&attr.value)
        }
        Expr::Name(name) => {
            // A bare reference is enough: aliasing a denied builtin and
            // calling it later would otherwise slip through
            if let Some(builtin) = denied_builtin(name.id.as_str()) {
                return Err(RejectReason::DeniedReference(builtin.to_string()));
            }
            if let Some(denied) = denied_attribute(name.id.as_str()) {
                return Err(RejectReason::DeniedAttribute(denied.to_string()));
            }
            Ok(())
        }
        Expr::BoolOp(op) => check_exprs(&op.values),
        Expr::NamedExpr(expr) => {
            check_expr(&expr.target)?;
            check_expr(&expr.value)
        }
        Expr::BinOp(op) => {
            check_expr(&op.left)?;
            check_expr(&op.right)
        }
        Expr::UnaryOp(op) => check_expr(&op.operand),
        Expr::Lambda(lambda) => {
            check_arguments(&lambda.args)?;
            check_expr(&lambda.body)
        }
        Expr::IfExp(expr) => {
            check_expr(&expr.test)?;
            check_expr(&expr.body)?;
            check_expr(&expr.orelse)
        }
        Expr::Dict(dict) => {
            for key in dict.keys.iter().flatten() {
                check_expr(key)?;
            }
            check_exprs(&dict.values)
        }
        Expr::Set(set) => check_exprs(&set.elts),
        Expr::ListComp(comp) => {
            check_expr(&comp.elt)?;
            check_comprehensions(&comp.generators)
        }
        Expr::SetComp(comp) => {
            check_expr(&comp.elt)?;
            check_comprehensions(&comp.generators)
        }
        Expr::DictComp(comp) => {
            check_expr(&comp.key)?;
            check_expr(&comp.value)?;
            check_comprehensions(&comp.generators)
        }
        Expr::GeneratorExp(comp) => {
            check_expr(&comp.elt)?;
            check_comprehensions(&comp.generators)
        }
        Expr::Await(expr) => check_expr(&expr.value),
        Expr::Yield(expr) => check_opt_expr(expr.value.as_deref()),
        Expr::YieldFrom(expr) => check_expr(&expr.value),
        Expr::Compare(cmp) => {
            check_expr(&cmp.left)?;
            check_exprs(&cmp.comparators)
        }
        Expr::FormattedValue(fv) => {
            check_expr(&fv.value)?;
            check_opt_expr(fv.format_spec.as_deref())
        }
        Expr::JoinedStr(joined) => check_exprs(&joined.values),
        Expr::Constant(_) => Ok(()),
        Expr::Subscript(sub) => {
            check_expr(&sub.value)?;
            check_expr(&sub.slice)
        }
        Expr::Starred(starred) => check_expr(&starred.value),
        Expr::List(list) => check_exprs(&list.elts),
        Expr::Tuple(tuple) => check_exprs(&tuple.elts),
        Expr::Slice(slice) => {
            check_opt_expr(slice.lower.as_deref())?;
            check_opt_expr(slice.upper.as_deref())?;
            check_opt_expr(slice.step.as_deref())
        }
    }
}

fn check_stmts(stmts: &[Stmt]) -> Result<(), RejectReason> {
    for stmt in stmts {
        check_stmt(stmt)?;
    }
    Ok(())
}

fn check_exprs(exprs: &[Expr]) -> Result<(), RejectReason> {
    for expr in exprs {
        check_expr(expr)?;
    }
    Ok(())
}

fn check_opt_expr(expr: Option<&Expr>) -> Result<(), RejectReason> {
    match expr {
        Some(expr) => check_expr(expr),
        None => Ok(()),
    }
}

fn check_arguments(args: &Arguments) -> Result<(), RejectReason> {
    for arg in args
        .posonlyargs
        .iter()
        .chain(&args.args)
        .chain(&args.kwonlyargs)
    {
        check_arg_with_default(arg)?;
    }
    if let Some(ref vararg) = args.vararg {
        check_arg(vararg)?;
    }
    if let Some(ref kwarg) = args.kwarg {
        check_arg(kwarg)?;
    }
    Ok(())
}

fn check_arg_with_default(arg: &ArgWithDefault) -> Result<(), RejectReason> {
    check_arg(&arg.def)?;
    check_opt_expr(arg.default.as_deref())
}

fn check_arg(arg: &Arg) -> Result<(), RejectReason> {
    check_opt_expr(arg.annotation.as_deref())
}

fn check_keywords(keywords: &[Keyword]) -> Result<(), RejectReason> {
    for keyword in keywords {
        check_expr(&keyword.value)?;
    }
    Ok(())
}

fn check_comprehensions(generators: &[Comprehension]) -> Result<(), RejectReason> {
    for generator in generators {
        check_expr(&generator.target)?;
        check_expr(&generator.iter)?;
        check_exprs(&generator.ifs)?;
    }
    Ok(())
}

fn check_with_items(items: &[WithItem]) -> Result<(), RejectReason> {
    for item in items {
        check_expr(&item.context_expr)?;
        check_opt_expr(item.optional_vars.as_deref())?;
    }
    Ok(())
}

fn check_except_handler(handler: &ExceptHandler) -> Result<(), RejectReason> {
    match handler {
        ExceptHandler::ExceptHandler(handler) => {
            check_opt_expr(handler.type_.as_deref())?;
            check_stmts(&handler.body)
        }
    }
}

fn check_match_case(case: &MatchCase) -> Result<(), RejectReason> {
    check_pattern(&case.pattern)?;
    check_opt_expr(case.guard.as_deref())?;
    check_stmts(&case.body)
}

fn check_pattern(pattern: &Pattern) -> Result<(), RejectReason> {
    match pattern {
        Pattern::MatchValue(value) => check_expr(&value.value),
        Pattern::MatchSingleton(_) => Ok(()),
        Pattern::MatchSequence(seq) => {
            for pattern in &seq.patterns {
                check_pattern(pattern)?;
            }
            Ok(())
        }
        Pattern::MatchMapping(mapping) => {
            check_exprs(&mapping.keys)?;
            for pattern in &mapping.patterns {
                check_pattern(pattern)?;
            }
            Ok(())
        }
        Pattern::MatchClass(class) => {
            check_expr(&class.cls)?;
            for pattern in class.patterns.iter().chain(&class.kwd_patterns) {
                check_pattern(pattern)?;
            }
            Ok(())
        }
        Pattern::MatchStar(_) => Ok(()),
        Pattern::MatchAs(as_pattern) => match as_pattern.pattern.as_deref() {
            Some(inner) => check_pattern(inner),
            None => Ok(()),
        },
        Pattern::MatchOr(or_pattern) => {
            for pattern in &or_pattern.patterns {
                check_pattern(pattern)?;
            }
            Ok(())
        }
    }
}
