use chrono::{DateTime, Utc};
use ratatui::{
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, List, ListItem, Paragraph, Wrap},
    Frame,
};
use uuid::Uuid;

use crate::app::{App, AuthMode, ComposeField, InputField, View, VimMode};
use nexus_shared::PostView;

/// Comments rendered inline under the selected post before truncating.
const MAX_COMMENTS_SHOWN: usize = 5;

pub fn draw(f: &mut Frame, app: &App) {
    // Draw based on current view
    match app.view {
        View::Login => draw_login(f, app),
        View::VerifyingSession => draw_loading(f, "Verifying session..."),
        View::Feed => draw_feed(f, app),
        View::Profile => draw_profile(f, app),
    }

    // Draw error overlay if present
    if let Some(ref error) = app.error_message {
        draw_error_popup(f, error);
    }

    // Draw loading overlay if loading
    if app.loading {
        draw_loading_overlay(f, &app.loading_message);
    }
}

fn draw_login(f: &mut Frame, app: &App) {
    let area = f.area();

    let is_register = app.auth_mode == AuthMode::Register;
    let form_height = if is_register { 15 } else { 12 };

    // Center the login form
    let vertical = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage(25),
            Constraint::Length(form_height),
            Constraint::Percentage(25),
        ])
        .split(area);

    let horizontal = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage(25),
            Constraint::Percentage(50),
            Constraint::Percentage(25),
        ])
        .split(vertical[1]);

    let form_area = horizontal[1];

    // Form container
    let title = if is_register { " Register " } else { " Login " };
    let form_block = Block::default()
        .title(title)
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Cyan));

    let inner = form_block.inner(form_area);
    f.render_widget(form_block, form_area);

    // Form layout
    let constraints = if is_register {
        vec![
            Constraint::Length(3), // Username
            Constraint::Length(3), // Email
            Constraint::Length(3), // Password
            Constraint::Length(2), // Submit hint
            Constraint::Min(0),    // Spacer
        ]
    } else {
        vec![
            Constraint::Length(3), // Username
            Constraint::Length(3), // Password
            Constraint::Length(2), // Submit hint
            Constraint::Min(0),    // Spacer
        ]
    };

    let form_chunks = Layout::default()
        .direction(Direction::Vertical)
        .margin(1)
        .constraints(constraints)
        .split(inner);

    let field_style = |field: InputField| {
        if app.auth_field == field {
            Style::default().fg(Color::Yellow)
        } else {
            Style::default().fg(Color::Gray)
        }
    };

    // Username field
    let username_block = Block::default()
        .title(" Username ")
        .borders(Borders::ALL)
        .border_style(field_style(InputField::Username));
    let username_text = Paragraph::new(app.auth_username.as_str()).block(username_block);
    f.render_widget(username_text, form_chunks[0]);

    // Email field (register only)
    if is_register {
        let email_block = Block::default()
            .title(" Email ")
            .borders(Borders::ALL)
            .border_style(field_style(InputField::Email));
        let email_text = Paragraph::new(app.auth_email.as_str()).block(email_block);
        f.render_widget(email_text, form_chunks[1]);
    }

    // Password field
    let password_idx = if is_register { 2 } else { 1 };
    let password_block = Block::default()
        .title(" Password ")
        .borders(Borders::ALL)
        .border_style(field_style(InputField::Password));
    let password_display = "*".repeat(app.auth_password.len());
    let password_text = Paragraph::new(password_display.as_str()).block(password_block);
    f.render_widget(password_text, form_chunks[password_idx]);

    // Submit hint
    let hint_idx = password_idx + 1;
    let mode_text = match (app.vim_mode, is_register) {
        (VimMode::Normal, false) => "'i' edit | Enter submit | 'r' register | 'q' quit",
        (VimMode::Normal, true) => "'i' edit | Enter submit | 'l' login | 'q' quit",
        (VimMode::Insert, _) => "Type to enter | Esc normal | Enter submit",
    };
    let hint = Paragraph::new(mode_text)
        .style(Style::default().fg(Color::DarkGray))
        .alignment(Alignment::Center);
    f.render_widget(hint, form_chunks[hint_idx]);

    // Set cursor position in insert mode
    if app.vim_mode == VimMode::Insert {
        let (x, y) = match app.auth_field {
            InputField::Username => (
                form_chunks[0].x + 1 + app.auth_username.len() as u16,
                form_chunks[0].y + 1,
            ),
            InputField::Email if is_register => (
                form_chunks[1].x + 1 + app.auth_email.len() as u16,
                form_chunks[1].y + 1,
            ),
            InputField::Email => (form_chunks[0].x + 1, form_chunks[0].y + 1),
            InputField::Password => (
                form_chunks[password_idx].x + 1 + app.auth_password.len() as u16,
                form_chunks[password_idx].y + 1,
            ),
        };
        f.set_cursor_position((x, y));
    }
}

fn draw_feed(f: &mut Frame, app: &App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // Header
            Constraint::Min(0),    // Posts
            Constraint::Length(1), // Status bar
        ])
        .split(f.area());

    draw_header(f, chunks[0], app, "Feed");
    draw_post_list(
        f,
        chunks[1],
        &app.posts,
        app.selected_post,
        app.api.user_id(),
        "Feed",
    );
    draw_feed_status_bar(f, chunks[2]);

    if app.composing {
        draw_compose_popup(f, app);
    }
    if app.commenting {
        draw_comment_popup(f, app);
    }
    if app.editing_avatar {
        draw_avatar_popup(f, app);
    }
    if app.confirming_delete {
        draw_delete_confirm_popup(f);
    }
    if app.searching {
        draw_search_popup(f, app);
    }
}

fn draw_profile(f: &mut Frame, app: &App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // Header
            Constraint::Length(2), // Profile info
            Constraint::Min(0),    // Posts
            Constraint::Length(1), // Status bar
        ])
        .split(f.area());

    draw_header(f, chunks[0], app, "Profile");

    let (name, avatar) = app
        .profile_user
        .as_ref()
        .map(|u| (u.username.as_str(), u.avatar.as_str()))
        .unwrap_or(("unknown", ""));

    let info = Paragraph::new(Line::from(vec![
        Span::styled(name, Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD)),
        Span::raw("   "),
        Span::styled("avatar: ", Style::default().fg(Color::DarkGray)),
        Span::styled(avatar, Style::default().fg(Color::DarkGray)),
    ]));
    f.render_widget(info, chunks[1]);

    let title = format!("{}'s posts", name);
    draw_post_list(
        f,
        chunks[2],
        &app.profile_posts,
        app.selected_profile_post,
        app.api.user_id(),
        &title,
    );

    draw_profile_status_bar(f, chunks[3]);
}

fn draw_header(f: &mut Frame, area: Rect, app: &App, context: &str) {
    let username = app
        .api
        .session()
        .map(|s| s.username.as_str())
        .unwrap_or("anonymous");

    let header = Paragraph::new(vec![Line::from(vec![
        Span::styled(
            "NEXUS",
            Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
        ),
        Span::raw(" | "),
        Span::styled(context, Style::default().fg(Color::Yellow)),
        Span::raw(" | "),
        Span::styled(username, Style::default().fg(Color::Green)),
    ])])
    .block(Block::default().borders(Borders::BOTTOM));

    f.render_widget(header, area);
}

fn draw_post_list(
    f: &mut Frame,
    area: Rect,
    posts: &[PostView],
    selected: usize,
    viewer: Option<Uuid>,
    title: &str,
) {
    if posts.is_empty() {
        let empty = Paragraph::new("No posts yet.")
            .style(Style::default().fg(Color::DarkGray))
            .block(
                Block::default()
                    .borders(Borders::ALL)
                    .title(format!(" {} ", title)),
            );
        f.render_widget(empty, area);
        return;
    }

    let visible_height = area.height.saturating_sub(2) as usize;

    // Keep the selection on screen: draw from the top while everything
    // up to the selected card fits, otherwise pin the selection to the
    // top of the window.
    let mut height_to_selected = 0;
    for (i, post) in posts.iter().enumerate().take(selected + 1) {
        height_to_selected += post_card_lines(post, i == selected, viewer).len() + 1;
    }
    let start = if height_to_selected > visible_height {
        selected
    } else {
        0
    };

    let mut lines: Vec<Line> = Vec::new();
    let mut last_shown = start;

    for (i, post) in posts.iter().enumerate().skip(start) {
        let card = post_card_lines(post, i == selected, viewer);

        if lines.len() + card.len() > visible_height {
            if lines.is_empty() {
                // A single card taller than the window still gets drawn
                lines.extend(card.into_iter().take(visible_height));
                last_shown = i;
            }
            break;
        }

        lines.extend(card);
        lines.push(Line::from(""));
        last_shown = i;
    }

    let has_more_above = start > 0;
    let has_more_below = last_shown + 1 < posts.len();
    let scroll_indicator = if has_more_above && has_more_below {
        " ↑↓"
    } else if has_more_above {
        " ↑"
    } else if has_more_below {
        " ↓"
    } else {
        ""
    };

    let widget = Paragraph::new(lines).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Cyan))
            .title(format!(" {} ({}){} ", title, posts.len(), scroll_indicator)),
    );

    f.render_widget(widget, area);
}

/// The lines of one post card. The selected card additionally shows its
/// latest comments.
fn post_card_lines<'a>(
    post: &'a PostView,
    is_selected: bool,
    viewer: Option<Uuid>,
) -> Vec<Line<'a>> {
    let bg_style = if is_selected {
        Style::default().bg(Color::DarkGray)
    } else {
        Style::default()
    };

    let mut lines = Vec::new();

    // Author + relative time
    lines.push(Line::from(vec![
        Span::styled(" ", bg_style),
        Span::styled(
            post.author.username.as_str(),
            bg_style.fg(Color::Cyan).add_modifier(Modifier::BOLD),
        ),
        Span::styled("  ", bg_style),
        Span::styled(
            format_time_ago(post.created_at),
            bg_style.fg(Color::DarkGray),
        ),
    ]));

    if !post.content.is_empty() {
        lines.push(Line::from(vec![
            Span::styled(" ", bg_style),
            Span::styled(post.content.replace('\n', " "), bg_style.fg(Color::White)),
        ]));
    }

    if let Some(ref image) = post.image {
        lines.push(Line::from(vec![
            Span::styled(" ", bg_style),
            Span::styled(format!("image: {}", image), bg_style.fg(Color::Magenta)),
        ]));
    }

    // Likes and comment count
    let liked = viewer.map_or(false, |id| post.likes.contains(&id));
    let heart_color = if liked { Color::Red } else { Color::DarkGray };
    lines.push(Line::from(vec![
        Span::styled(" ", bg_style),
        Span::styled(format!("♥ {}", post.likes.len()), bg_style.fg(heart_color)),
        Span::styled("  ", bg_style),
        Span::styled(
            format!("💬 {}", post.comments.len()),
            bg_style.fg(Color::DarkGray),
        ),
    ]));

    if is_selected && !post.comments.is_empty() {
        let shown = post.comments.len().min(MAX_COMMENTS_SHOWN);
        if post.comments.len() > shown {
            lines.push(Line::from(Span::styled(
                format!("   ({} earlier comments)", post.comments.len() - shown),
                Style::default().fg(Color::DarkGray),
            )));
        }
        for comment in &post.comments[post.comments.len() - shown..] {
            lines.push(Line::from(vec![
                Span::raw("   "),
                Span::styled(
                    comment.author.username.as_str(),
                    Style::default().fg(Color::Yellow),
                ),
                Span::raw(": "),
                Span::raw(comment.text.replace('\n', " ")),
            ]));
        }
    }

    lines
}

fn draw_feed_status_bar(f: &mut Frame, area: Rect) {
    let status = Paragraph::new(Line::from(vec![
        Span::styled(" FEED ", Style::default().bg(Color::Blue).fg(Color::White)),
        Span::raw(" "),
        Span::styled(
            "n: post | space: like | c: comment | d: delete | p: author | P: me | /: search | a: avatar | r: refresh | L: logout | q: quit",
            Style::default().fg(Color::DarkGray),
        ),
    ]));

    f.render_widget(status, area);
}

fn draw_profile_status_bar(f: &mut Frame, area: Rect) {
    let status = Paragraph::new(Line::from(vec![
        Span::styled(
            " PROFILE ",
            Style::default().bg(Color::Magenta).fg(Color::White),
        ),
        Span::raw(" "),
        Span::styled(
            "j/k: scroll | r: refresh | Esc: back | q: quit",
            Style::default().fg(Color::DarkGray),
        ),
    ]));

    f.render_widget(status, area);
}

fn draw_compose_popup(f: &mut Frame, app: &App) {
    let area = centered_rect(60, 30, f.area());

    f.render_widget(Clear, area);

    let block = Block::default()
        .title(" New Post ")
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Cyan));

    let inner = block.inner(area);
    f.render_widget(block, area);

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .margin(1)
        .constraints([
            Constraint::Length(3), // Content
            Constraint::Length(3), // Image path
            Constraint::Length(2), // Hint
            Constraint::Min(0),    // Spacer
        ])
        .split(inner);

    let field_style = |field: ComposeField| {
        if app.compose_field == field {
            Style::default().fg(Color::Yellow)
        } else {
            Style::default().fg(Color::Gray)
        }
    };

    let content_block = Block::default()
        .title(" Content ")
        .borders(Borders::ALL)
        .border_style(field_style(ComposeField::Content));
    let content_text = Paragraph::new(app.compose_content.as_str()).block(content_block);
    f.render_widget(content_text, chunks[0]);

    let image_block = Block::default()
        .title(" Image path (optional) ")
        .borders(Borders::ALL)
        .border_style(field_style(ComposeField::Image));
    let image_text = Paragraph::new(app.compose_image_path.as_str()).block(image_block);
    f.render_widget(image_text, chunks[1]);

    let hint = Paragraph::new("Enter: post | Tab: switch field | Esc: cancel")
        .style(Style::default().fg(Color::DarkGray))
        .alignment(Alignment::Center);
    f.render_widget(hint, chunks[2]);

    let (x, y) = match app.compose_field {
        ComposeField::Content => (
            chunks[0].x + 1 + app.compose_content.len() as u16,
            chunks[0].y + 1,
        ),
        ComposeField::Image => (
            chunks[1].x + 1 + app.compose_image_path.len() as u16,
            chunks[1].y + 1,
        ),
    };
    f.set_cursor_position((x, y));
}

fn draw_comment_popup(f: &mut Frame, app: &App) {
    let area = centered_rect(50, 20, f.area());

    f.render_widget(Clear, area);

    let block = Block::default()
        .title(" Comment ")
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Cyan));

    let inner = block.inner(area);
    f.render_widget(block, area);

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .margin(1)
        .constraints([
            Constraint::Length(3), // Text input
            Constraint::Length(2), // Hint
            Constraint::Min(0),    // Spacer
        ])
        .split(inner);

    let text_block = Block::default()
        .title(" Text ")
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Yellow));
    let text = Paragraph::new(app.comment_text.as_str()).block(text_block);
    f.render_widget(text, chunks[0]);

    let hint = Paragraph::new("Enter: submit | Esc: cancel")
        .style(Style::default().fg(Color::DarkGray))
        .alignment(Alignment::Center);
    f.render_widget(hint, chunks[1]);

    f.set_cursor_position((
        chunks[0].x + 1 + app.comment_text.len() as u16,
        chunks[0].y + 1,
    ));
}

fn draw_avatar_popup(f: &mut Frame, app: &App) {
    let area = centered_rect(60, 20, f.area());

    f.render_widget(Clear, area);

    let block = Block::default()
        .title(" Change Avatar ")
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Cyan));

    let inner = block.inner(area);
    f.render_widget(block, area);

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .margin(1)
        .constraints([
            Constraint::Length(3), // Path input
            Constraint::Length(2), // Hint
            Constraint::Min(0),    // Spacer
        ])
        .split(inner);

    let path_block = Block::default()
        .title(" Image path ")
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Yellow));
    let path_text = Paragraph::new(app.avatar_path.as_str()).block(path_block);
    f.render_widget(path_text, chunks[0]);

    let hint = Paragraph::new("Enter: upload | Esc: cancel")
        .style(Style::default().fg(Color::DarkGray))
        .alignment(Alignment::Center);
    f.render_widget(hint, chunks[1]);

    f.set_cursor_position((
        chunks[0].x + 1 + app.avatar_path.len() as u16,
        chunks[0].y + 1,
    ));
}

fn draw_delete_confirm_popup(f: &mut Frame) {
    let area = centered_rect(40, 15, f.area());

    f.render_widget(Clear, area);

    let block = Block::default()
        .title(" Delete Post ")
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Red));

    let text = Paragraph::new("Delete this post? (y/n)")
        .alignment(Alignment::Center)
        .block(block);

    f.render_widget(text, area);
}

fn draw_search_popup(f: &mut Frame, app: &App) {
    let area = centered_rect(60, 60, f.area());

    f.render_widget(Clear, area);

    let block = Block::default()
        .title(" Search Users ")
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Cyan));

    let inner = block.inner(area);
    f.render_widget(block, area);

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .margin(1)
        .constraints([
            Constraint::Length(3), // Query input
            Constraint::Min(0),    // Results
            Constraint::Length(1), // Hint
        ])
        .split(inner);

    let query_block = Block::default()
        .title(" Username ")
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Yellow));
    let query_text = Paragraph::new(app.search_query.as_str()).block(query_block);
    f.render_widget(query_text, chunks[0]);

    if app.search_results.is_empty() {
        let placeholder = if app.search_query.chars().count() < 2 {
            "Type at least two characters to search"
        } else {
            "No matches"
        };
        let empty = Paragraph::new(placeholder).style(Style::default().fg(Color::DarkGray));
        f.render_widget(empty, chunks[1]);
    } else {
        let visible = chunks[1].height as usize;
        let start = app.selected_result.saturating_sub(visible.saturating_sub(1));

        let items: Vec<ListItem> = app
            .search_results
            .iter()
            .enumerate()
            .skip(start)
            .take(visible)
            .map(|(i, user)| {
                let style = if i == app.selected_result {
                    Style::default().bg(Color::DarkGray).fg(Color::White)
                } else {
                    Style::default()
                };
                ListItem::new(Line::from(vec![
                    Span::raw("  "),
                    Span::styled(user.username.as_str(), style),
                ]))
            })
            .collect();

        f.render_widget(List::new(items), chunks[1]);
    }

    let hint = Paragraph::new("Enter: open profile | Up/Down: select | Esc: close")
        .style(Style::default().fg(Color::DarkGray))
        .alignment(Alignment::Center);
    f.render_widget(hint, chunks[2]);

    f.set_cursor_position((
        chunks[0].x + 1 + app.search_query.len() as u16,
        chunks[0].y + 1,
    ));
}

fn draw_loading(f: &mut Frame, message: &str) {
    let area = f.area();

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Cyan));

    f.render_widget(block, area);

    let text = Paragraph::new(message)
        .style(Style::default().fg(Color::Yellow))
        .alignment(Alignment::Center);

    let center = centered_rect(50, 20, area);
    f.render_widget(text, center);
}

fn draw_loading_overlay(f: &mut Frame, message: &str) {
    let area = centered_rect(40, 10, f.area());

    f.render_widget(Clear, area);

    let block = Block::default()
        .title(" Loading ")
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Yellow));

    let text = Paragraph::new(message)
        .style(Style::default().fg(Color::Yellow))
        .alignment(Alignment::Center)
        .block(block);

    f.render_widget(text, area);
}

fn draw_error_popup(f: &mut Frame, error: &str) {
    let area = centered_rect(60, 20, f.area());

    f.render_widget(Clear, area);

    let block = Block::default()
        .title(" Error ")
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Red));

    let text = Paragraph::new(error)
        .style(Style::default().fg(Color::Red))
        .wrap(Wrap { trim: true })
        .block(block);

    f.render_widget(text, area);
}

fn centered_rect(percent_x: u16, percent_y: u16, r: Rect) -> Rect {
    let popup_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(r);

    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(popup_layout[1])[1]
}

/// Relative label for a post timestamp ("just now", "5m ago", ...).
pub fn format_time_ago(timestamp: DateTime<Utc>) -> String {
    let seconds = (Utc::now() - timestamp).num_seconds();

    if seconds < 60 {
        return "just now".to_string();
    }
    let minutes = seconds / 60;
    if minutes < 60 {
        return format!("{}m ago", minutes);
    }
    let hours = minutes / 60;
    if hours < 24 {
        return format!("{}h ago", hours);
    }
    let days = hours / 24;
    if days < 7 {
        return format!("{}d ago", days);
    }

    timestamp.format("%b %d, %Y").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn recent_timestamps_are_just_now() {
        assert_eq!(format_time_ago(Utc::now()), "just now");
        assert_eq!(
            format_time_ago(Utc::now() - Duration::seconds(30)),
            "just now"
        );
    }

    #[test]
    fn buckets_scale_with_age() {
        assert_eq!(format_time_ago(Utc::now() - Duration::minutes(5)), "5m ago");
        assert_eq!(format_time_ago(Utc::now() - Duration::hours(3)), "3h ago");
        assert_eq!(format_time_ago(Utc::now() - Duration::days(2)), "2d ago");
    }

    #[test]
    fn old_timestamps_show_the_date() {
        let old = Utc::now() - Duration::days(30);
        assert_eq!(format_time_ago(old), old.format("%b %d, %Y").to_string());
    }
}
