//! Treewalk interpreter over the parsed script subset.

use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;
use futures::FutureExt;

use super::parser::{parse_program, ArrowBody, BinOp, Expr, Pattern, Stmt};
use super::value::{
    new_object, scope_assign, scope_define, scope_get, ImportKind, NativeFn, Scope, ScopeRef,
    UserFunction, Value,
};
use super::{ScriptError, ScriptResult};

/// The embedding side of module imports. Calls back into the module
/// evaluator, which may recurse into further evaluations.
#[async_trait]
pub trait ImportHost: Send + Sync {
    async fn import(&self, kind: ImportKind, specifier: &str) -> ScriptResult<Value>;
}

/// Parse and run one rewritten module. Top-level statements execute first
/// (they bind `main`), then `main()` is awaited and its result — the
/// module's exports object — is returned.
pub async fn run_module(
    code: &str,
    host: Arc<dyn ImportHost>,
    extra_globals: Vec<(String, Value)>,
) -> ScriptResult<Value> {
    let program = parse_program(code)?;
    let root = Scope::root();
    seed_globals(&root);
    seed_import_functions(&root);
    for (name, value) in extra_globals {
        scope_define(&root, name, value);
    }

    let interp = Interp { host };
    for stmt in &program {
        if let Flow::Return(_) = interp.exec_stmt(stmt, &root).await? {
            return Err(ScriptError::runtime("`return` outside of a function"));
        }
    }

    let main = scope_get(&root, "main")
        .ok_or_else(|| ScriptError::runtime("module wrapper did not bind `main`"))?;
    interp.call(main, Vec::new()).await
}

/// Inert stand-ins for ambient browser globals, so module top-levels that
/// register timers or listeners evaluate without throwing.
fn seed_globals(root: &ScopeRef) {
    let storage = new_object();
    {
        let mut s = storage.lock();
        s.set("getItem", Value::Native(NativeFn::Noop));
        s.set("setItem", Value::Native(NativeFn::Noop));
        s.set("removeItem", Value::Native(NativeFn::Noop));
    }
    let window = new_object();
    {
        let mut w = window.lock();
        w.set("setInterval", Value::Native(NativeFn::Noop));
        w.set("setTimeout", Value::Native(NativeFn::Noop));
        w.set("addEventListener", Value::Native(NativeFn::Noop));
        w.set("removeEventListener", Value::Native(NativeFn::Noop));
        w.set("localStorage", Value::Object(storage.clone()));
    }

    scope_define(root, "window", Value::Object(window.clone()));
    scope_define(root, "self", Value::Object(window.clone()));
    scope_define(root, "globalThis", Value::Object(window));
    scope_define(root, "setInterval", Value::Native(NativeFn::Noop));
    scope_define(root, "setTimeout", Value::Native(NativeFn::Noop));
    scope_define(root, "addEventListener", Value::Native(NativeFn::Noop));
    scope_define(root, "removeEventListener", Value::Native(NativeFn::Noop));
    scope_define(root, "localStorage", Value::Object(storage));
}

/// The three functions the rewriter emits in place of static imports. Each
/// dispatches into the [`ImportHost`] when called.
fn seed_import_functions(root: &ScopeRef) {
    scope_define(
        root,
        "_importNamespace",
        Value::Native(NativeFn::Import(ImportKind::Namespace)),
    );
    scope_define(
        root,
        "_importNamed",
        Value::Native(NativeFn::Import(ImportKind::Named)),
    );
    scope_define(
        root,
        "_importDefault",
        Value::Native(NativeFn::Import(ImportKind::Default)),
    );
}

enum Flow {
    Normal,
    Return(Value),
}

struct Interp {
    host: Arc<dyn ImportHost>,
}

impl Interp {
    fn exec_stmt<'a>(&'a self, stmt: &'a Stmt, scope: &'a ScopeRef) -> BoxFuture<'a, ScriptResult<Flow>> {
        async move {
            match stmt {
                Stmt::VarDecl { pattern, init } => {
                    let value = self.eval(init, scope).await?;
                    self.bind_pattern(pattern, value, scope)?;
                    Ok(Flow::Normal)
                }
                Stmt::FuncDecl { name, params, body } => {
                    let func = UserFunction::declared(params.clone(), body.clone(), scope.clone());
                    scope_define(scope, name.clone(), Value::Function(Arc::new(func)));
                    Ok(Flow::Normal)
                }
                Stmt::Return(expr) => {
                    let value = match expr {
                        Some(e) => self.eval(e, scope).await?,
                        None => Value::Undefined,
                    };
                    Ok(Flow::Return(value))
                }
                Stmt::Expr(expr) => {
                    self.eval(expr, scope).await?;
                    Ok(Flow::Normal)
                }
            }
        }
        .boxed()
    }

    fn bind_pattern(&self, pattern: &Pattern, value: Value, scope: &ScopeRef) -> ScriptResult<()> {
        match pattern {
            Pattern::Ident(name) => {
                scope_define(scope, name.clone(), value);
                Ok(())
            }
            Pattern::Object(entries) => {
                let obj = match value {
                    Value::Object(obj) => obj,
                    other => {
                        return Err(ScriptError::runtime(format!(
                            "cannot destructure a {}",
                            other.type_name()
                        )))
                    }
                };
                for (key, binding) in entries {
                    let prop = obj.lock().get(key).unwrap_or(Value::Undefined);
                    scope_define(scope, binding.clone(), prop);
                }
                Ok(())
            }
        }
    }

    fn eval<'a>(&'a self, expr: &'a Expr, scope: &'a ScopeRef) -> BoxFuture<'a, ScriptResult<Value>> {
        async move {
            match expr {
                Expr::Undefined => Ok(Value::Undefined),
                Expr::Null => Ok(Value::Null),
                Expr::Bool(b) => Ok(Value::Bool(*b)),
                Expr::Num(n) => Ok(Value::Num(*n)),
                Expr::Str(s) => Ok(Value::Str(s.clone())),
                Expr::Template { quasis, exprs } => {
                    let mut values = Vec::with_capacity(exprs.len());
                    for e in exprs {
                        values.push(self.eval(e, scope).await?);
                    }
                    Ok(Value::Str(interleave(quasis, &values)))
                }
                Expr::Tagged { tag, quasis, exprs } => {
                    let tag = self.eval(tag, scope).await?;
                    match tag {
                        Value::Native(NativeFn::TemplateTagNoop) => {
                            let mut values = Vec::with_capacity(exprs.len());
                            for e in exprs {
                                values.push(self.eval(e, scope).await?);
                            }
                            Ok(Value::Str(interleave(quasis, &values)))
                        }
                        other => Err(ScriptError::runtime(format!(
                            "cannot use a {} as a template tag",
                            other.type_name()
                        ))),
                    }
                }
                Expr::Ident(name) => scope_get(scope, name)
                    .ok_or_else(|| ScriptError::runtime(format!("`{}` is not defined", name))),
                Expr::Member { obj, prop } => {
                    let target = self.eval(obj, scope).await?;
                    match target {
                        Value::Object(obj) => {
                            Ok(obj.lock().get(prop).unwrap_or(Value::Undefined))
                        }
                        Value::Str(s) if prop == "length" => Ok(Value::Num(s.len() as f64)),
                        Value::Array(items) if prop == "length" => {
                            Ok(Value::Num(items.lock().len() as f64))
                        }
                        other => Err(ScriptError::runtime(format!(
                            "cannot read `{}` of {}",
                            prop,
                            other.type_name()
                        ))),
                    }
                }
                Expr::Call { callee, args } => {
                    let func = self.eval(callee, scope).await?;
                    let mut arg_values = Vec::with_capacity(args.len());
                    for a in args {
                        arg_values.push(self.eval(a, scope).await?);
                    }
                    self.call(func, arg_values).await
                }
                Expr::Await(inner) => self.eval(inner, scope).await,
                Expr::Arrow { params, body, is_async } => {
                    Ok(Value::Function(Arc::new(UserFunction {
                        params: params.clone(),
                        body: body.clone(),
                        is_async: *is_async,
                        closure: scope.clone(),
                    })))
                }
                Expr::Object(entries) => {
                    let obj = new_object();
                    for (key, value_expr) in entries {
                        let value = self.eval(value_expr, scope).await?;
                        obj.lock().set(key.clone(), value);
                    }
                    Ok(Value::Object(obj))
                }
                Expr::Array(items) => {
                    let mut values = Vec::with_capacity(items.len());
                    for item in items {
                        values.push(self.eval(item, scope).await?);
                    }
                    Ok(Value::Array(Arc::new(parking_lot::Mutex::new(values))))
                }
                Expr::Binary { op, left, right } => {
                    let l = self.eval(left, scope).await?;
                    let r = self.eval(right, scope).await?;
                    binary(op, l, r)
                }
                Expr::Neg(inner) => match self.eval(inner, scope).await? {
                    Value::Num(n) => Ok(Value::Num(-n)),
                    other => Err(ScriptError::runtime(format!(
                        "cannot negate a {}",
                        other.type_name()
                    ))),
                },
                Expr::Assign { target, value } => {
                    let value = self.eval(value, scope).await?;
                    match &**target {
                        Expr::Ident(name) => {
                            scope_assign(scope, name, value.clone());
                            Ok(value)
                        }
                        Expr::Member { obj, prop } => {
                            let target = self.eval(obj, scope).await?;
                            match target {
                                Value::Object(obj) => {
                                    obj.lock().set(prop.clone(), value.clone());
                                    Ok(value)
                                }
                                other => Err(ScriptError::runtime(format!(
                                    "cannot set `{}` on {}",
                                    prop,
                                    other.type_name()
                                ))),
                            }
                        }
                        _ => Err(ScriptError::runtime("invalid assignment target")),
                    }
                }
            }
        }
        .boxed()
    }

    fn call<'a>(&'a self, func: Value, args: Vec<Value>) -> BoxFuture<'a, ScriptResult<Value>> {
        async move {
            match func {
                Value::Function(f) => {
                    let frame = Scope::child(&f.closure);
                    for (i, param) in f.params.iter().enumerate() {
                        let arg = args.get(i).cloned().unwrap_or(Value::Undefined);
                        scope_define(&frame, param.clone(), arg);
                    }
                    match &f.body {
                        ArrowBody::Expr(expr) => self.eval(expr, &frame).await,
                        ArrowBody::Block(stmts) => {
                            for stmt in stmts {
                                if let Flow::Return(value) =
                                    self.exec_stmt(stmt, &frame).await?
                                {
                                    return Ok(value);
                                }
                            }
                            Ok(Value::Undefined)
                        }
                    }
                }
                Value::Native(NativeFn::Noop) => Ok(Value::Undefined),
                Value::Native(NativeFn::TemplateTagNoop) => {
                    // Called as a plain function: `css(["a"], x)`.
                    let quasis: Vec<String> = match args.first() {
                        Some(Value::Array(items)) => items
                            .lock()
                            .iter()
                            .map(|v| v.to_display_string())
                            .collect(),
                        _ => Vec::new(),
                    };
                    Ok(Value::Str(interleave(&quasis, args.get(1..).unwrap_or(&[]))))
                }
                Value::Native(NativeFn::Import(kind)) => {
                    let specifier = match args.first() {
                        Some(Value::Str(s)) => s.clone(),
                        _ => {
                            return Err(ScriptError::runtime(
                                "import call requires a string specifier",
                            ))
                        }
                    };
                    self.host.import(kind, &specifier).await
                }
                other => Err(ScriptError::runtime(format!(
                    "cannot call a {}",
                    other.type_name()
                ))),
            }
        }
        .boxed()
    }
}

fn interleave(quasis: &[String], values: &[Value]) -> String {
    let mut out = String::new();
    for (i, quasi) in quasis.iter().enumerate() {
        out.push_str(quasi);
        if let Some(value) = values.get(i) {
            out.push_str(&value.to_display_string());
        }
    }
    out
}

fn binary(op: &BinOp, l: Value, r: Value) -> ScriptResult<Value> {
    if let BinOp::Add = op {
        if matches!(l, Value::Str(_)) || matches!(r, Value::Str(_)) {
            return Ok(Value::Str(format!(
                "{}{}",
                l.to_display_string(),
                r.to_display_string()
            )));
        }
    }
    match (l, r) {
        (Value::Num(a), Value::Num(b)) => Ok(Value::Num(match op {
            BinOp::Add => a + b,
            BinOp::Sub => a - b,
            BinOp::Mul => a * b,
            BinOp::Div => a / b,
        })),
        (l, r) => Err(ScriptError::runtime(format!(
            "cannot apply arithmetic to {} and {}",
            l.type_name(),
            r.type_name()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NoImports;

    #[async_trait]
    impl ImportHost for NoImports {
        async fn import(&self, _kind: ImportKind, specifier: &str) -> ScriptResult<Value> {
            Err(ScriptError::runtime(format!(
                "unexpected import of `{}`",
                specifier
            )))
        }
    }

    struct CannedImports;

    #[async_trait]
    impl ImportHost for CannedImports {
        async fn import(&self, kind: ImportKind, _specifier: &str) -> ScriptResult<Value> {
            match kind {
                ImportKind::Named | ImportKind::Namespace => {
                    let obj = new_object();
                    obj.lock().set("color", Value::Str("red".into()));
                    Ok(Value::Object(obj))
                }
                ImportKind::Default => Ok(Value::Str("default-thing".into())),
            }
        }
    }

    async fn run(code: &str) -> ScriptResult<Value> {
        run_module(code, Arc::new(NoImports), Vec::new()).await
    }

    fn wrap(body: &str) -> String {
        format!(
            "main = async () => {{\nconst _exports = {{}};\n{}\nreturn _exports\n}}",
            body
        )
    }

    fn export(exports: &Value, name: &str) -> Value {
        match exports {
            Value::Object(obj) => obj.lock().get(name).unwrap(),
            other => panic!("exports is a {}", other.type_name()),
        }
    }

    #[tokio::test]
    async fn runs_the_module_wrapper_and_returns_exports() {
        let exports = run(&wrap("const x = 1 + 2;\n_exports.x = x;")).await.unwrap();
        assert!(matches!(export(&exports, "x"), Value::Num(n) if n == 3.0));
    }

    #[tokio::test]
    async fn template_literals_interpolate_values() {
        let exports = run(&wrap(
            "const color = 'red';\n_exports.css = `color: ${color};`;",
        ))
        .await
        .unwrap();
        assert!(matches!(
            export(&exports, "css"),
            Value::Str(s) if s == "color: red;"
        ));
    }

    #[tokio::test]
    async fn tagged_template_with_noop_tag_yields_plain_text() {
        let code = wrap("_exports.a = css`width: ${2 * 3}px;`;");
        let exports = run_module(
            &code,
            Arc::new(NoImports),
            vec![("css".to_string(), Value::Native(NativeFn::TemplateTagNoop))],
        )
        .await
        .unwrap();
        assert!(matches!(
            export(&exports, "a"),
            Value::Str(s) if s == "width: 6px;"
        ));
    }

    #[tokio::test]
    async fn destructuring_import_bindings() {
        let code = wrap(
            "const {color} = await _importNamed(\"./theme.js\");\n_exports.color = color;",
        );
        let exports = run_module(&code, Arc::new(CannedImports), Vec::new())
            .await
            .unwrap();
        assert!(matches!(
            export(&exports, "color"),
            Value::Str(s) if s == "red"
        ));
    }

    /// The rewriter's emitted import calls must work with no extra context
    /// setup: all three functions are bound in every fresh root scope.
    #[tokio::test]
    async fn import_functions_are_bound_in_every_context() {
        let code = wrap(
            "const ns = await _importNamespace(\"./theme.js\");\nconst {color} = await _importNamed(\"./theme.js\");\nconst d = await _importDefault(\"./theme.js\");\n_exports.ns = ns.color;\n_exports.color = color;\n_exports.d = d;",
        );
        let exports = run_module(&code, Arc::new(CannedImports), Vec::new())
            .await
            .unwrap();
        assert!(matches!(export(&exports, "ns"), Value::Str(s) if s == "red"));
        assert!(matches!(export(&exports, "color"), Value::Str(s) if s == "red"));
        assert!(matches!(
            export(&exports, "d"),
            Value::Str(s) if s == "default-thing"
        ));
    }

    #[tokio::test]
    async fn tag_called_as_a_plain_function_without_arguments() {
        let code = wrap("_exports.a = css();");
        let exports = run_module(
            &code,
            Arc::new(NoImports),
            vec![("css".to_string(), Value::Native(NativeFn::TemplateTagNoop))],
        )
        .await
        .unwrap();
        assert!(matches!(export(&exports, "a"), Value::Str(s) if s.is_empty()));
    }

    #[tokio::test]
    async fn ambient_globals_are_inert() {
        let exports = run(&wrap(
            "setInterval(() => {}, 1000);\nwindow.addEventListener('load', () => {});\nlocalStorage.setItem('k', 'v');\n_exports.ok = true;",
        ))
        .await
        .unwrap();
        assert!(matches!(export(&exports, "ok"), Value::Bool(true)));
    }

    #[tokio::test]
    async fn function_declarations_and_calls() {
        let exports = run(&wrap(
            "function double (n) { return n * 2 }\n_exports.v = double(21);",
        ))
        .await
        .unwrap();
        assert!(matches!(export(&exports, "v"), Value::Num(n) if n == 42.0));
    }

    #[tokio::test]
    async fn undefined_reference_is_a_runtime_error() {
        let err = run(&wrap("_exports.x = missing;")).await.unwrap_err();
        match err {
            ScriptError::Runtime { message } => assert!(message.contains("missing")),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[tokio::test]
    async fn host_errors_pass_through_imports() {
        let code = wrap("const ns = await _importNamespace(\"./gone.js\");");
        let err = run_module(&code, Arc::new(NoImports), Vec::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ScriptError::Runtime { .. }));
    }
}
