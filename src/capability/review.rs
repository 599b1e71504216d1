//! Code Review Capabilities
//!
//! A small set of built-in capabilities that review Python source held in
//! the run's `code` key, plus the looping graph that chains them. The
//! analysis is line-based and heuristic.
//!
//! # State Keys
//!
//! | Key                 | Written by             |
//! |---------------------|------------------------|
//! | `functions`         | `extract_functions`    |
//! | `avg_complexity`    | `check_complexity`     |
//! | `issues`            | `detect_issues`        |
//! | `quality_score`     | `suggest_improvements` |
//! | `loop_iteration`    | `quality_below_threshold` |

use log::debug;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::{CapabilityError, GraphError, StepError};
use crate::workflow::state::LOOP_LOG_ID;
use crate::workflow::{Graph, Node, WorkflowState};

use super::CapabilityRegistry;

/// Identity of the graph built by [`code_review_graph`].
pub const CODE_REVIEW_GRAPH_ID: &str = "code_review_agent";

/// Default `quality_threshold` when the run does not set one.
pub const DEFAULT_QUALITY_THRESHOLD: f64 = 80.0;

/// Default `max_iterations` of the review loop when the run does not set one.
pub const DEFAULT_REVIEW_ITERATIONS: i64 = 5;

/// Functions longer than this many lines are reported.
const LONG_FUNCTION_LINES: usize = 50;

/// Functions with more arguments than this are reported.
const MAX_ARGS: usize = 5;

/// Python source used when a review is started without code.
pub const EXAMPLE_CODE: &str = r#"
def calculate_total(items, discount=0, tax_rate=0.1):
    """Calculate total with discount and tax"""
    subtotal = sum(item['price'] * item['quantity'] for item in items)
    discounted = subtotal * (1 - discount)
    total = discounted * (1 + tax_rate)
    return total

def process_order(order_id, customer_info, items, payment_method):
    # TODO: Add validation
    total = calculate_total(items)
    if payment_method == 'credit':
        charge_credit_card(customer_info, total)
    elif payment_method == 'paypal':
        charge_paypal(customer_info, total)
    else:
        raise ValueError("Invalid payment method")

    print(f"Order {order_id} processed")
    return {"order_id": order_id, "total": total}

def charge_credit_card(customer, amount):
    # FIXME: Implement actual charging
    pass
"#;

/// A function found in the reviewed source.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct FunctionInfo {
    pub name: String,
    pub line_start: usize,
    pub line_end: usize,
    pub args_count: usize,
    pub has_docstring: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub complexity: Option<usize>,
}

/// Registers the code review capabilities.
pub fn register_builtins(registry: &CapabilityRegistry) -> Result<(), CapabilityError> {
    registry.register_step("extract_functions", extract_functions)?;
    registry.register_step("check_complexity", check_complexity)?;
    registry.register_step("detect_issues", detect_issues)?;
    registry.register_step("suggest_improvements", suggest_improvements)?;
    registry.register_condition("quality_below_threshold", quality_below_threshold)?;
    Ok(())
}

/// Builds the code review graph.
///
/// extract -> complexity -> detect -> suggest -> loop_check, where
/// `loop_check` loops back to `extract` while the quality score is below
/// the threshold.
pub fn code_review_graph() -> Result<Graph, GraphError> {
    let mut graph = Graph::new(CODE_REVIEW_GRAPH_ID);

    let nodes = [
        Node::new("extract", "Extract Functions", "extract_functions"),
        Node::new("complexity", "Check Complexity", "check_complexity"),
        Node::new("detect", "Detect Issues", "detect_issues"),
        Node::new("suggest", "Suggest Improvements", "suggest_improvements"),
        Node::from_fn("loop_check", "Check Quality Loop", |state| {
            state.append_log("loop_check", "Checking if quality threshold is met", None);
            Ok(None)
        })
        .with_loop_condition("quality_below_threshold"),
    ];
    let edges = [
        ("extract", "complexity"),
        ("complexity", "detect"),
        ("detect", "suggest"),
        ("suggest", "loop_check"),
        ("loop_check", "extract"),
    ];

    for node in nodes {
        graph.add_node(node)?;
    }
    for (from, to) in edges {
        graph.add_edge(from, to)?;
    }
    Ok(graph)
}

fn code(state: &WorkflowState) -> Result<String, StepError> {
    match state.get("code").and_then(Value::as_str) {
        Some(code) if !code.trim().is_empty() => Ok(code.to_string()),
        _ => Err("No code provided".into()),
    }
}

fn functions(state: &WorkflowState) -> Result<Vec<FunctionInfo>, StepError> {
    match state.get("functions") {
        Some(value) => Ok(serde_json::from_value(value.clone())?),
        None => Ok(Vec::new()),
    }
}

fn number(state: &WorkflowState, key: &str, default: f64) -> f64 {
    state.get(key).and_then(Value::as_f64).unwrap_or(default)
}

fn indent_of(line: &str) -> usize {
    line.len() - line.trim_start().len()
}

/// Counts the regular parameters of a `def` signature.
///
/// Positional-only parameters before `/` and everything from the first
/// `*` on (`*args`, keyword-only parameters, `**kwargs`) are not counted.
fn count_args(signature: &str) -> usize {
    let Some(open) = signature.find('(') else {
        return 0;
    };
    let close = signature.rfind(')').unwrap_or(signature.len());
    if close <= open {
        return 0;
    }

    let mut depth = 0usize;
    let mut params = vec![String::new()];
    for c in signature[open + 1..close].chars() {
        match c {
            '(' | '[' | '{' => depth += 1,
            ')' | ']' | '}' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => {
                params.push(String::new());
                continue;
            }
            _ => {}
        }
        if let Some(current) = params.last_mut() {
            current.push(c);
        }
    }

    let mut count = 0;
    for param in params.iter().map(|p| p.trim()) {
        match param {
            "" => {}
            "/" => count = 0,
            p if p.starts_with('*') => break,
            _ => count += 1,
        }
    }
    count
}

/// Finds `def` blocks in Python source.
pub fn find_functions(code: &str) -> Vec<FunctionInfo> {
    let lines: Vec<&str> = code.lines().collect();
    let mut found = Vec::new();

    for (i, line) in lines.iter().enumerate() {
        let trimmed = line.trim_start();
        let Some(rest) = trimmed
            .strip_prefix("def ")
            .or_else(|| trimmed.strip_prefix("async def "))
        else {
            continue;
        };
        let name = rest.split('(').next().unwrap_or_default().trim().to_string();
        let def_indent = indent_of(line);

        // The signature may continue over several lines
        let mut signature = line.to_string();
        let mut header_end = i;
        while !signature.trim_end().ends_with(':') && header_end + 1 < lines.len() {
            header_end += 1;
            signature.push_str(lines[header_end]);
        }

        let mut line_end = header_end;
        let mut first_body_line = None;
        for (j, body) in lines.iter().enumerate().skip(header_end + 1) {
            if body.trim().is_empty() {
                continue;
            }
            if indent_of(body) <= def_indent {
                break;
            }
            first_body_line.get_or_insert(body.trim_start());
            line_end = j;
        }

        let has_docstring = first_body_line
            .map(|l| l.starts_with("\"\"\"") || l.starts_with("'''") || l.starts_with('"') || l.starts_with('\''))
            .unwrap_or(false);

        found.push(FunctionInfo {
            name,
            line_start: i + 1,
            line_end: line_end + 1,
            args_count: count_args(&signature),
            has_docstring,
            complexity: None,
        });
    }

    found
}

/// Cyclomatic complexity of the lines `line_start..=line_end` (1-based).
///
/// Comments and string literals, docstrings included, are ignored.
pub fn complexity_of(code: &str, function: &FunctionInfo) -> usize {
    const BRANCHES: &[&str] = &["if ", "elif ", "while ", "for ", "async for ", "except"];

    let mut open_quote = None;
    let mut complexity = 1;
    for line in code
        .lines()
        .skip(function.line_start.saturating_sub(1))
        .take(function.line_end + 1 - function.line_start.max(1))
    {
        let stripped = strip_strings(line, &mut open_quote);
        let l = stripped.trim_start();
        if BRANCHES.iter().any(|b| l.starts_with(b)) {
            complexity += 1;
        }
        complexity += l.matches(" and ").count() + l.matches(" or ").count();
    }
    complexity
}

/// Drops the comment and string literal contents of one line of Python.
///
/// `open` carries an unterminated triple-quoted string over to the next line.
fn strip_strings(line: &str, open: &mut Option<&'static str>) -> String {
    let mut out = String::with_capacity(line.len());
    let mut rest = line;

    while !rest.is_empty() {
        if let Some(delim) = *open {
            match rest.find(delim) {
                Some(end) => {
                    rest = &rest[end + delim.len()..];
                    *open = None;
                    continue;
                }
                None => break,
            }
        }
        if rest.starts_with('#') {
            break;
        }
        if let Some(delim) = ["\"\"\"", "'''"].into_iter().find(|d| rest.starts_with(*d)) {
            *open = Some(delim);
            rest = &rest[delim.len()..];
            continue;
        }

        let mut chars = rest.chars();
        let Some(c) = chars.next() else {
            break;
        };
        if c == '"' || c == '\'' {
            rest = skip_quoted(chars.as_str(), c);
        } else {
            out.push(c);
            rest = chars.as_str();
        }
    }
    out
}

/// Returns what follows the closing `quote` of a single-line string.
fn skip_quoted(s: &str, quote: char) -> &str {
    let mut chars = s.char_indices();
    while let Some((i, c)) = chars.next() {
        if c == '\\' {
            chars.next();
        } else if c == quote {
            return &s[i + c.len_utf8()..];
        }
    }
    ""
}

/// Extracts function definitions from `code`.
pub fn extract_functions(state: &mut WorkflowState) -> Result<Option<Value>, StepError> {
    let code = code(state)?;
    let functions = find_functions(&code);
    debug!("Extracted {} functions", functions.len());

    let count = functions.len();
    let functions = serde_json::to_value(&functions)?;
    state.set_many([
        ("functions", functions.clone()),
        ("functions_count", json!(count)),
    ]);

    Ok(Some(json!({ "functions": functions, "count": count })))
}

/// Scores each extracted function's cyclomatic complexity.
pub fn check_complexity(state: &mut WorkflowState) -> Result<Option<Value>, StepError> {
    let mut functions = functions(state)?;
    if functions.is_empty() {
        return Err("No functions found. Run extract_functions first.".into());
    }
    let code = code(state)?;

    for function in &mut functions {
        function.complexity = Some(complexity_of(&code, function));
    }

    let scores: Vec<usize> = functions.iter().filter_map(|f| f.complexity).collect();
    let avg_complexity = scores.iter().sum::<usize>() as f64 / scores.len() as f64;
    let max_complexity = scores.iter().copied().max().unwrap_or(0);

    let functions = serde_json::to_value(&functions)?;
    state.set_many([
        ("functions", functions.clone()),
        ("avg_complexity", json!(avg_complexity)),
        ("max_complexity", json!(max_complexity)),
    ]);

    Ok(Some(json!({
        "avg_complexity": avg_complexity,
        "max_complexity": max_complexity,
        "functions": functions,
    })))
}

/// Detects long functions, wide signatures, missing docstrings, and code smells.
pub fn detect_issues(state: &mut WorkflowState) -> Result<Option<Value>, StepError> {
    let code = code(state)?;
    let mut issues = Vec::new();

    for function in functions(state)? {
        let lines = function.line_end.saturating_sub(function.line_start);
        if lines > LONG_FUNCTION_LINES {
            issues.push(json!({
                "type": "long_function",
                "function": function.name,
                "message": format!("Function {} is too long ({} lines)", function.name, lines),
            }));
        }
        if function.args_count > MAX_ARGS {
            issues.push(json!({
                "type": "too_many_args",
                "function": function.name,
                "message": format!(
                    "Function {} has too many arguments ({})",
                    function.name, function.args_count
                ),
            }));
        }
        if !function.has_docstring {
            issues.push(json!({
                "type": "missing_docstring",
                "function": function.name,
                "message": format!("Function {} is missing a docstring", function.name),
            }));
        }
    }

    if code.contains("TODO") || code.contains("FIXME") {
        issues.push(json!({
            "type": "todo_found",
            "message": "Code contains TODO or FIXME comments",
        }));
    }
    if code.contains("print(") {
        issues.push(json!({
            "type": "print_statement",
            "message": "Code contains print statements (consider using logging)",
        }));
    }

    let count = issues.len();
    state.set_many([("issues", json!(issues)), ("issues_count", json!(count))]);
    Ok(Some(json!({ "issues": issues, "count": count })))
}

/// Turns detected issues into suggestions and a quality score.
pub fn suggest_improvements(state: &mut WorkflowState) -> Result<Option<Value>, StepError> {
    let issues = state
        .get("issues")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();
    let avg_complexity = number(state, "avg_complexity", 0.0);
    let issues_of = |kind: &str| {
        issues
            .iter()
            .filter(|i| i.get("type").and_then(Value::as_str) == Some(kind))
            .count()
    };

    let mut suggestions = Vec::new();
    if avg_complexity > 10.0 {
        suggestions.push(json!({
            "priority": "high",
            "message": "Average cyclomatic complexity is high. Consider breaking down complex functions.",
        }));
    }
    let long_functions = issues_of("long_function");
    if long_functions > 0 {
        suggestions.push(json!({
            "priority": "medium",
            "message": format!("Consider splitting {} long function(s) into smaller ones", long_functions),
        }));
    }
    let missing_docs = issues_of("missing_docstring");
    if missing_docs > 0 {
        suggestions.push(json!({
            "priority": "low",
            "message": format!("Add docstrings to {} function(s)", missing_docs),
        }));
    }

    let complexity_penalty = ((avg_complexity - 5.0) * 2.0).max(0.0);
    let quality_score = (100.0 - issues.len() as f64 * 5.0 - complexity_penalty).max(0.0);

    let count = suggestions.len();
    state.set_many([
        ("suggestions", json!(suggestions)),
        ("quality_score", json!(quality_score)),
        ("suggestions_count", json!(count)),
    ]);

    Ok(Some(json!({
        "suggestions": suggestions,
        "quality_score": quality_score,
        "count": count,
    })))
}

/// Keeps the review loop going while the quality score is below the
/// threshold and the iteration budget is not spent.
pub fn quality_below_threshold(state: &mut WorkflowState) -> Result<bool, StepError> {
    let quality_score = number(state, "quality_score", 0.0);
    let threshold = number(state, "quality_threshold", DEFAULT_QUALITY_THRESHOLD);
    let iteration = state.get("loop_iteration").and_then(Value::as_i64).unwrap_or(0);
    let max_iterations = state
        .get("max_iterations")
        .and_then(Value::as_i64)
        .unwrap_or(DEFAULT_REVIEW_ITERATIONS);

    let should_continue = quality_score < threshold && iteration < max_iterations;

    if should_continue {
        state.set("loop_iteration", iteration + 1);
        state.append_log(
            LOOP_LOG_ID,
            format!(
                "Loop continuing: iteration={}, quality_score={}, threshold={}",
                iteration + 1,
                quality_score,
                threshold
            ),
            None,
        );
    } else {
        state.append_log(
            LOOP_LOG_ID,
            format!(
                "Loop terminating: quality_score={}, threshold={}, iteration={}",
                quality_score, threshold, iteration
            ),
            None,
        );
    }

    Ok(should_continue)
}
