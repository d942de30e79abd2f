//! HTML renderer for the predictor page.
//!
//! Generates a standalone page with inline CSS: the CGPA form, the outcome
//! of the last action, visitor counters, and the feedback form with recent
//! entries.

use crate::store::{CounterState, FeedbackEntry};

/// Outcome banner shown above a form.
#[derive(Debug, Clone, PartialEq)]
pub enum Notice {
    Success(String),
    Error(String),
}

/// Everything one page render needs.
#[derive(Debug, Clone, Default)]
pub struct PageView {
    pub counts: CounterState,
    /// Last submitted CGPA, echoed back into the input.
    pub cgpa_input: String,
    pub prediction: Option<Notice>,
    pub feedback: Option<Notice>,
    pub recent_feedback: Vec<FeedbackEntry>,
}

impl PageView {
    #[must_use]
    pub fn new(counts: CounterState) -> Self {
        Self {
            counts,
            ..Self::default()
        }
    }
}

/// Page renderer.
///
/// # Example
///
/// ```rust,ignore
/// let view = PageView::new(CounterState::default());
/// let html = PageTemplate::new(&view).render();
/// assert!(html.contains("Placement Predictor"));
/// ```
#[derive(Debug)]
pub struct PageTemplate<'a> {
    view: &'a PageView,
}

impl<'a> PageTemplate<'a> {
    #[must_use]
    pub fn new(view: &'a PageView) -> Self {
        Self { view }
    }

    /// Render the page as an HTML string.
    #[must_use]
    pub fn render(&self) -> String {
        let counts = &self.view.counts;
        let prediction_html = Self::render_notice(self.view.prediction.as_ref());
        let feedback_notice_html = Self::render_notice(self.view.feedback.as_ref());
        let feedback_list_html = self.render_feedback_list();
        let rating_options = (1..=5)
            .rev()
            .map(|r| format!(r#"<option value="{r}">{stars}</option>"#, stars = "★".repeat(r)))
            .collect::<String>();

        format!(
            r##"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>Placement Predictor</title>
    <style>
        :root {{
            --color-bg: #0f172a;
            --color-card: #1e293b;
            --color-border: #334155;
            --color-text: #e2e8f0;
            --color-text-muted: #94a3b8;
            --color-primary: #3b82f6;
            --color-success: #22c55e;
            --color-error: #ef4444;
        }}
        * {{ margin: 0; padding: 0; box-sizing: border-box; }}
        body {{
            font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, Arial, sans-serif;
            background-color: var(--color-bg);
            color: var(--color-text);
            line-height: 1.6;
            padding: 2rem;
        }}
        .container {{ max-width: 720px; margin: 0 auto; }}
        .header {{
            display: flex;
            align-items: center;
            gap: 1rem;
            margin-bottom: 2rem;
            padding-bottom: 1rem;
            border-bottom: 1px solid var(--color-border);
        }}
        .logo {{
            font-weight: 800;
            font-size: 1.25rem;
            background: var(--color-primary);
            border-radius: 0.5rem;
            padding: 0.25rem 0.6rem;
        }}
        .card {{
            background-color: var(--color-card);
            border: 1px solid var(--color-border);
            border-radius: 0.5rem;
            padding: 1.5rem;
            margin-bottom: 1.5rem;
        }}
        .stats {{ display: grid; grid-template-columns: 1fr 1fr; gap: 1rem; }}
        .stat-title {{ font-size: 0.8rem; color: var(--color-text-muted); text-transform: uppercase; }}
        .stat-value {{ font-size: 1.75rem; font-weight: 700; }}
        label {{ display: block; margin: 0.5rem 0 0.25rem; color: var(--color-text-muted); }}
        input, textarea, select {{
            width: 100%;
            padding: 0.5rem;
            border-radius: 0.375rem;
            border: 1px solid var(--color-border);
            background: var(--color-bg);
            color: var(--color-text);
        }}
        button {{
            margin-top: 1rem;
            padding: 0.5rem 1.25rem;
            border: none;
            border-radius: 0.375rem;
            background: var(--color-primary);
            color: white;
            cursor: pointer;
        }}
        .notice {{ margin-top: 1rem; padding: 0.75rem; border-radius: 0.375rem; }}
        .notice.success {{ border: 1px solid var(--color-success); color: var(--color-success); }}
        .notice.error {{ border: 1px solid var(--color-error); color: var(--color-error); }}
        .feedback-item {{ padding: 0.5rem 0; border-bottom: 1px solid var(--color-border); }}
        .feedback-meta {{ font-size: 0.8rem; color: var(--color-text-muted); }}
        .no-data {{ color: var(--color-text-muted); }}
    </style>
</head>
<body>
    <div class="container">
        <div class="header">
            <span class="logo">TR</span>
            <h1>Placement Predictor</h1>
        </div>

        <div class="card">
            <form method="post" action="/predict">
                <label for="cgpa">Your CGPA (0 - 10)</label>
                <input id="cgpa" name="cgpa" type="text" inputmode="decimal" value="{cgpa_input}" required>
                <button type="submit">Predict package</button>
            </form>
            {prediction_html}
        </div>

        <div class="card stats">
            <div>
                <div class="stat-title">Total users</div>
                <div class="stat-value">{total_users}</div>
            </div>
            <div>
                <div class="stat-title">Predictions made</div>
                <div class="stat-value">{predictions}</div>
            </div>
        </div>

        <div class="card">
            <h2>Feedback</h2>
            <form method="post" action="/feedback">
                <label for="name">Name</label>
                <input id="name" name="name" type="text" required>
                <label for="email">Email</label>
                <input id="email" name="email" type="email" required>
                <label for="message">Message</label>
                <textarea id="message" name="message" rows="3" required></textarea>
                <label for="rating">Rating</label>
                <select id="rating" name="rating">{rating_options}</select>
                <button type="submit">Send feedback</button>
            </form>
            {feedback_notice_html}
        </div>

        <div class="card">
            <h2>Recent feedback</h2>
            {feedback_list_html}
        </div>
    </div>
</body>
</html>"##,
            cgpa_input = escape_html(&self.view.cgpa_input),
            prediction_html = prediction_html,
            total_users = counts.total_users,
            predictions = counts.predictions,
            rating_options = rating_options,
            feedback_notice_html = feedback_notice_html,
            feedback_list_html = feedback_list_html,
        )
    }

    fn render_notice(notice: Option<&Notice>) -> String {
        match notice {
            None => String::new(),
            Some(Notice::Success(text)) => {
                format!(r#"<div class="notice success">{}</div>"#, escape_html(text))
            }
            Some(Notice::Error(text)) => {
                format!(r#"<div class="notice error">{}</div>"#, escape_html(text))
            }
        }
    }

    fn render_feedback_list(&self) -> String {
        if self.view.recent_feedback.is_empty() {
            return r#"<div class="no-data">No feedback yet.</div>"#.to_string();
        }

        let mut html = String::new();
        for entry in &self.view.recent_feedback {
            html.push_str(&format!(
                r#"<div class="feedback-item">
                    <div>{stars} {message}</div>
                    <div class="feedback-meta">{name} &middot; {date}</div>
                </div>"#,
                stars = "★".repeat(usize::from(entry.rating)),
                message = escape_html(&entry.message),
                name = escape_html(&entry.name),
                date = entry.timestamp.format("%Y-%m-%d"),
            ));
        }
        html
    }
}

/// Escape HTML special characters.
fn escape_html(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}
