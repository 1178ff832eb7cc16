//! Prompt 模板
//!
//! 全部以 {placeholder} 占位，调用方用 str::replace 填充。
//! 要求 LLM 输出 JSON 的模板都声明「只输出 JSON」，解析失败时各调用方自行降级。

/// 目标设备抽取：从用户请求中圈出在册设备
pub const DEVICE_EXTRACTION_PROMPT: &str = r#"You are a network operations assistant. Identify which devices from the inventory the user's request targets.

Inventory:
{inventory}

User request:
{query}

Respond with ONLY a JSON array, one entry per targeted device:
[{"device_name": "<name from inventory>", "role": "<role if known>", "profile": "<profile if known>"}]

Rules:
- Only include devices that appear in the inventory.
- If the request addresses a group (e.g. "all edge routers"), expand it using the inventory roles.
- If no inventory device matches, respond with an empty array: []"#;

/// 计划选择：为单台设备挑选计划并定制目标
pub const PLANNER_PROMPT: &str = r#"You are an investigation planner for network devices. Choose the most suitable plan for the device below and tailor the objective to the user's request.

Available plans:
{plans}

Device under investigation:
{device}

User request:
{query}

Insights from previous sessions (may be empty):
{learnings}

Respond with ONLY a JSON object:
{"intent": "<intent of the chosen plan>", "objective": "<one-sentence objective tailored to this device>", "steps": ["<step 1>", "<step 2>", ...]}

You may reorder, drop or reword plan steps to fit the request, but stay within what the chosen plan is for."#;

/// 推理 oracle：把一条自然语言步骤落成具体工具调用
pub const ORACLE_PROMPT: &str = r#"You are executing one step of a network device investigation. Decide which of the available tools to call, with which parameters, to carry out the instruction.

Available tools:
{catalog}

Respond with ONLY a JSON array of calls, in execution order:
[{"function": "<tool name>", "params": {...}}]

Rules:
- Zero, one or several calls are all valid. Use results from prior steps to pick parameters.
- If no available tool can help with this instruction, respond with exactly: NONE"#;

/// 目标评估：判断单台设备的调查结果是否满足其目标
pub const JUDGE_PROMPT: &str = r#"You are assessing one device investigation. Decide whether the gathered results satisfy the stated objective.

User request:
{query}

Device investigation (objective, executed steps, results, errors, noted limitations):
{investigation}

Insights from previous sessions (may be empty):
{learnings}

Respond with ONLY a JSON object:
{"met": <true|false>, "retriable": <true|false>, "feedback": <string or null>}

Rules:
- "met" is true only if the objective is answered by the collected data.
- "retriable" is false when the noted limitations show that another attempt cannot plausibly help (tool or device-side restriction). In that case the investigation should be accepted with limitations.
- When "met" is false and "retriable" is true, "feedback" must give specific, actionable guidance for the next attempt (narrower focus, different parameters)."#;

/// 最终报告：汇总整个会话
pub const REPORT_PROMPT: &str = r#"You are writing the final report of a network device investigation session for a network engineer.

Session data (JSON):
{session}

Write a concise markdown report with:
- a one-paragraph answer to the user's request,
- one section per device summarizing findings, citing concrete values from tool results,
- an explicit note for anything that could not be determined (limitations, errors, retries exhausted, cancellation).

Do not invent data that is not in the session."#;

/// 跨会话学习：从本次会话提炼模式与设备关系
pub const INSIGHTS_PROMPT: &str = r#"You are analyzing a finished network investigation session to extract insights that will help future investigations.

Session data (JSON):
{session}

Respond with ONLY a JSON object with two markdown-formatted string fields:
{"learned_patterns": "<technical patterns, behaviors or troubleshooting approaches worth remembering>", "device_relationships": "<connectivity, dependency or protocol relationships discovered between devices>"}

If nothing noteworthy was learned, use empty strings."#;
