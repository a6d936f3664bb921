//! Prompt 模板：规划、步骤求解、观察续写、修复、总结
//!
//! 模板使用 `{placeholder}` 占位，可在配置 [prompts] 段中整体覆盖。

use serde::Deserialize;

/// 全部 prompt 模板
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PromptTemplates {
    /// 占位：{query} {max_steps} {tools}
    pub plan: String,
    /// 占位：{query} {tools} {schema} {scratchpad} {step_index} {step}
    pub step: String,
    /// 占位：{prompt} {output} {tool} {observation}
    pub observation: String,
    /// 占位：{query} {tools} {schema} {scratchpad} {step_index} {step} {reason} {thought} {action} {observation} {result}
    pub repair: String,
    /// 占位：{query} {results}
    pub summarize: String,
}

impl Default for PromptTemplates {
    fn default() -> Self {
        Self {
            plan: "You are a planning assistant. Break the user's request into a short ordered list of concrete steps \
(at most {max_steps}). Use as few steps as possible; a simple request needs a single step.\n\
Available tools:\n{tools}\n\n\
Respond with JSON only, in the form {\"steps\": [\"first step\", \"second step\"]}.\n\n\
Request:\n{query}"
                .to_string(),
            step: "You are solving one step of a larger task.\n\
Overall request: {query}\n\n\
Available tools:\n{tools}\n\n\
To use a tool, write your reasoning on a line starting with \"Thought:\" and then a single line of the form\n\
<tool>: <argument>\n\
for example: calculator: (12 + 3) * 4\n\
When you know the answer, reply with a JSON object matching this schema:\n{schema}\n\n\
Previous steps:\n{scratchpad}\n\n\
Step {step_index}: {step}"
                .to_string(),
            observation: "{prompt}\n\n\
Your previous output:\n{output}\n\n\
Observation from {tool}: {observation}\n\n\
Using this observation, give the final answer for the step as JSON, or call one more tool if strictly necessary."
                .to_string(),
            repair: "A previous attempt at this step failed verification.\n\
Overall request: {query}\n\n\
Available tools:\n{tools}\n\n\
Failure reason: {reason}\n\
Previous thought: {thought}\n\
Previous action: {action}\n\
Previous observation: {observation}\n\
Previous result: {result}\n\n\
Fix the problem. To use a tool, write a single line <tool>: <argument>. \
Otherwise reply with a JSON object matching this schema:\n{schema}\n\n\
Previous steps:\n{scratchpad}\n\n\
Step {step_index}: {step}"
                .to_string(),
            summarize: "Combine the step results below into one clear, complete answer to the request. \
Keep every concrete value (numbers, names) from the results.\n\n\
Step results:\n{results}\n\n\
Request:\n{query}"
                .to_string(),
        }
    }
}

/// 将模板中的 `{key}` 替换为对应的值
///
/// 单次从左到右扫描模板；代入的值原样复制，其中出现的 `{key}` 不会再被替换。未知占位保持原样。
pub fn render(template: &str, vars: &[(&str, &str)]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let value = after.find('}').and_then(|close| {
            let key = &after[..close];
            vars.iter()
                .find(|(k, _)| *k == key)
                .map(|(_, v)| (*v, close))
        });
        match value {
            Some((v, close)) => {
                out.push_str(v);
                rest = &after[close + 1..];
            }
            None => {
                out.push('{');
                rest = after;
            }
        }
    }
    out.push_str(rest);
    out
}

/// Available tools 段落：每行 `- name: description`
pub fn tools_section(descriptions: &[(String, String)]) -> String {
    if descriptions.is_empty() {
        return "(none)".to_string();
    }
    descriptions
        .iter()
        .map(|(name, desc)| format!("- {}: {}", name, desc))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_replaces_all_occurrences() {
        let out = render("{a} and {a} but {b}", &[("a", "x"), ("b", "y")]);
        assert_eq!(out, "x and x but y");
    }

    #[test]
    fn test_substituted_values_are_copied_literally() {
        let out = render(
            "Request: {query}\nStep {step}",
            &[("query", "What does {step} and {scratchpad} mean?"), ("step", "Multiply"), ("scratchpad", "(none)")],
        );
        assert_eq!(out, "Request: What does {step} and {scratchpad} mean?\nStep Multiply");
        assert_eq!(render("{unknown} {a}{", &[("a", "{a}")]), "{unknown} {a}{");
        assert_eq!(render("{{a}}", &[("a", "x")]), "{x}");
    }

    #[test]
    fn test_default_templates_end_with_the_subject() {
        let t = PromptTemplates::default();
        let plan = render(&t.plan, &[("query", "Calcule 123 * 47"), ("max_steps", "8"), ("tools", "-")]);
        assert!(plan.trim_end().ends_with("Calcule 123 * 47"));
        let step = render(&t.step, &[("step_index", "1"), ("step", "Multiply")]);
        assert!(step.trim_end().ends_with("Step 1: Multiply"));
        // 只替换已知占位，JSON 示例中的花括号保持原样
        assert!(plan.contains("{\"steps\""));
    }

    #[test]
    fn test_tools_section() {
        assert_eq!(tools_section(&[]), "(none)");
        let s = tools_section(&[("calculator".into(), "math".into())]);
        assert_eq!(s, "- calculator: math");
    }
}
