//! Enforcement pack: custom lints for trail-core invariants.
//!
//! Everything the library emits must go through `tracing`, so that trace and
//! request ids are attached and nothing unredacted reaches a terminal.
//!
//! ## Implemented Lints
//!
//! - `NO_PRINTLN`: Forbids println!, eprintln!, print!, eprint! and dbg!
//!   in favor of `tracing` events and `TrailLog`.

#![feature(rustc_private)]
#![warn(unused_extern_crates)]

extern crate rustc_ast;
extern crate rustc_lint;
extern crate rustc_session;
extern crate rustc_span;

use rustc_ast::{Expr, ExprKind, MacCall};
use rustc_lint::{EarlyContext, EarlyLintPass, LintContext};
use rustc_session::{declare_lint_pass, declare_tool_lint};

declare_tool_lint! {
    /// **What it does:** Forbids direct console output macros in library code.
    ///
    /// **Why is this bad?** Console output skips the structured logging path:
    /// - It carries no `trace_id` or `request_id` fields
    /// - It ignores the subscriber's level filtering
    /// - It can print captured bodies or headers before redaction
    ///
    /// **Known problems:** Demo binaries that print to the terminal on
    /// purpose need an `#[allow]`.
    ///
    /// **Example:**
    /// ```rust,ignore
    /// // Bad
    /// println!("trail delivered: {}", record.trace_id);
    /// dbg!(&record.request);
    ///
    /// // Good
    /// tracing::info!(trace_id = %record.trace_id, "trail delivered");
    /// TrailLog::for_trail(&trail).info(format_args!("trail delivered"));
    /// ```
    pub enforcement_pack::NO_PRINTLN,
    Deny,
    "use of console output macros; use tracing or TrailLog instead"
}

declare_lint_pass!(NoPrintln => [NO_PRINTLN]);

/// Console macros and the `tracing` macro to suggest for each.
const CONSOLE_MACROS: &[(&str, &str)] = &[
    ("println", "tracing::info!"),
    ("print", "tracing::info!"),
    ("eprintln", "tracing::warn!"),
    ("eprint", "tracing::warn!"),
    ("dbg", "tracing::debug!"),
];

impl EarlyLintPass for NoPrintln {
    fn check_expr(&mut self, cx: &EarlyContext<'_>, expr: &Expr) {
        if let ExprKind::MacCall(mac) = &expr.kind {
            check_macro(cx, mac, expr.span);
        }
    }
}

fn check_macro(cx: &EarlyContext<'_>, mac: &MacCall, span: rustc_span::Span) {
    // Only bare macro names; `std::println!` style paths are rare enough to skip.
    let [segment] = mac.path.segments.as_slice() else {
        return;
    };
    let name = segment.ident.name.as_str();

    let Some((_, replacement)) = CONSOLE_MACROS.iter().find(|(m, _)| *m == name) else {
        return;
    };

    cx.span_lint(NO_PRINTLN, span, |diag| {
        diag.help(format!(
            "use `{replacement}` or `TrailLog` for structured logging"
        ));
        diag.note(format!(
            "`{name}!` carries no trail ids and may print unredacted data"
        ));
    });
}

#[unsafe(no_mangle)]
#[allow(unsafe_code)]
pub extern "C" fn register_lints(_sess: &rustc_session::Session, lint_store: &mut rustc_lint::LintStore) {
    lint_store.register_lints(&[&NO_PRINTLN]);
    lint_store.register_early_pass(|| Box::new(NoPrintln));
}

#[unsafe(no_mangle)]
pub fn dylint_version() -> *mut std::os::raw::c_char {
    std::ffi::CString::new(dylint_linting::DYLINT_VERSION)
        .expect("version string contains null byte")
        .into_raw()
}
