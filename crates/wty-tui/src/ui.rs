use crate::app::{App, InputMode, Row};
use ratatui::{
    Frame,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, List, ListItem, ListState, Paragraph, Wrap},
};
use wty_core::{Code, FilterCriteria, ShopFilter, StatusFilter};

pub fn draw(f: &mut Frame, app: &App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // Header
            Constraint::Min(0),    // Main content
            Constraint::Length(3), // Footer
        ])
        .split(f.area());

    draw_header(f, app, chunks[0]);
    draw_main(f, app, chunks[1]);
    draw_footer(f, app, chunks[2]);

    match app.input_mode {
        InputMode::Normal => {}
        InputMode::ShowingHelp => draw_help(f),
        mode => draw_prompt(f, app, mode),
    }
}

fn draw_header(f: &mut Frame, app: &App, area: Rect) {
    let filter = describe_filter(app.console.filter());
    let title = Line::from(vec![
        Span::styled(
            "wty - Warranty Code Console",
            Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
        ),
        Span::raw("  "),
        Span::styled(filter, Style::default().fg(Color::DarkGray)),
    ]);
    let header = Paragraph::new(title).block(Block::default().borders(Borders::ALL));
    f.render_widget(header, area);
}

fn describe_filter(criteria: &FilterCriteria) -> String {
    if !criteria.is_active() {
        return "no filters".to_string();
    }
    let mut parts = Vec::new();
    if !criteria.search.trim().is_empty() {
        parts.push(format!("search \"{}\"", criteria.search.trim()));
    }
    match criteria.status {
        StatusFilter::Any => {}
        StatusFilter::Activated => parts.push("activated".to_string()),
        StatusFilter::Pending => parts.push("pending".to_string()),
    }
    match &criteria.shop {
        ShopFilter::Any => {}
        ShopFilter::Unassigned => parts.push("unassigned".to_string()),
        ShopFilter::Only(id) => parts.push(format!("shop {id}")),
    }
    parts.join(", ")
}

fn draw_main(f: &mut Frame, app: &App, area: Rect) {
    let chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage(55), // Batches and codes
            Constraint::Percentage(45), // Details or stats
        ])
        .split(area);

    draw_batch_list(f, app, chunks[0]);
    if app.stats.is_some() {
        draw_stats(f, app, chunks[1]);
    } else {
        draw_details(f, app, chunks[1]);
    }
}

fn draw_batch_list(f: &mut Frame, app: &App, area: Rect) {
    let console = &app.console;
    let rows = app.rows();
    let mut items: Vec<ListItem> = Vec::with_capacity(rows.len());

    for row in &rows {
        let item = match row {
            Row::Batch(batch_id) => {
                let Some(batch) = console.batch(batch_id) else {
                    continue;
                };
                let expanded = console.is_expanded(batch_id);
                let prefix = if expanded { "▾" } else { "▸" };
                let mark = if expanded && console.batch_fully_selected(batch_id) {
                    "[x]"
                } else {
                    "[ ]"
                };
                let mut line = format!(
                    "{} {} {}  {}  ({}/{} activated, {} assigned)",
                    prefix,
                    mark,
                    batch.id,
                    console.product_name(&batch.product_id),
                    batch.activated_count,
                    batch.count,
                    batch.assigned_count
                );
                if console.cache().is_loading(batch_id) {
                    line.push_str("  loading...");
                }
                if let Some(error) = console.batch_error(batch_id) {
                    line.push_str(&format!("  ! {error}"));
                }
                ListItem::new(line)
            }
            Row::Code { batch_id, code_id } => {
                let code = console
                    .visible_codes(batch_id)
                    .into_iter()
                    .find(|c| &c.id == code_id);
                let Some(code) = code else {
                    continue;
                };
                let mark = if console.selection().contains(code_id) {
                    "[x]"
                } else {
                    "[ ]"
                };
                let status = if code.is_activated { "activated" } else { "pending" };
                let line = format!(
                    "  ├─ {} {}  {}  {}",
                    mark,
                    code.serial_number,
                    status,
                    console.shop_name(code.assigned_shop_id.as_ref())
                );
                ListItem::new(line).style(Style::default().fg(Color::Gray))
            }
        };
        items.push(item);
    }

    let title = format!(
        " Batches ({}) | {} selected ",
        console.visible_batches().len(),
        console.selection().len()
    );
    let empty = items.is_empty();
    let list = List::new(items)
        .block(Block::default().borders(Borders::ALL).title(title))
        .highlight_style(
            Style::default()
                .fg(Color::Yellow)
                .add_modifier(Modifier::BOLD),
        );

    let mut state = ListState::default();
    if !empty {
        state.select(Some(app.selected_row));
    }
    f.render_stateful_widget(list, area, &mut state);
}

fn code_lines(app: &App, code: &Code) -> Vec<String> {
    let console = &app.console;
    let mut lines = vec![
        format!("Serial:    {}", code.serial_number),
        format!("Code ID:   {}", code.id),
        format!("Product:   {}", console.product_name(&code.product_id)),
        format!("Batch:     {}", code.batch_id),
        format!(
            "Shop:      {}",
            console.shop_name(code.assigned_shop_id.as_ref())
        ),
        format!(
            "Status:    {}",
            if code.is_activated { "Activated" } else { "Pending" }
        ),
    ];
    if let Some(at) = code.activation_date {
        lines.push(format!("Activated: {}", at.date()));
    }
    if let Some(name) = &code.customer_name {
        lines.push(String::new());
        lines.push(format!("Customer:  {name}"));
        if let Some(phone) = &code.customer_phone {
            lines.push(format!("Phone:     {phone}"));
        }
        if let Some(address) = &code.customer_address {
            lines.push(format!("Address:   {address}"));
        }
    }
    lines
}

fn draw_details(f: &mut Frame, app: &App, area: Rect) {
    let console = &app.console;
    let text = match app.current_row() {
        Some(Row::Batch(batch_id)) => match console.batch(&batch_id) {
            Some(batch) => {
                let product = console.product(&batch.product_id);
                let mut lines = vec![
                    format!("Batch:     {}", batch.id),
                    format!("Product:   {}", console.product_name(&batch.product_id)),
                    format!("Created:   {}", batch.created_at.date()),
                    format!("Codes:     {}", batch.count),
                    format!("Activated: {}", batch.activated_count),
                    format!("Assigned:  {}", batch.assigned_count),
                ];
                if let Some(product) = product {
                    lines.push(format!("Warranty:  {} days", product.warranty_duration));
                }
                lines.push(String::new());
                lines.push(
                    "enter: expand  space: select batch  p: batch PDF  g: generate  D: delete batch"
                        .to_string(),
                );
                lines.join("\n")
            }
            None => String::new(),
        },
        Some(Row::Code { batch_id, code_id }) => console
            .visible_codes(&batch_id)
            .into_iter()
            .find(|c| c.id == code_id)
            .map(|code| code_lines(app, &code).join("\n"))
            .unwrap_or_default(),
        None => "No batches match.\n\nPress x to clear filters or g on a batch to generate codes."
            .to_string(),
    };

    let paragraph = Paragraph::new(text)
        .block(Block::default().borders(Borders::ALL).title(" Details "))
        .wrap(Wrap { trim: true });
    f.render_widget(paragraph, area);
}

fn draw_stats(f: &mut Frame, app: &App, area: Rect) {
    let Some(stats) = &app.stats else {
        return;
    };
    let mut lines = vec![
        format!("Shops:       {}", stats.total_shops),
        format!("Products:    {}", stats.total_products),
        format!("Codes:       {}", stats.total_codes),
        format!("Activated:   {}", stats.activated_codes),
        format!("Today:       {}", stats.today_activations),
    ];
    if !stats.top_products.is_empty() {
        lines.push(String::new());
        lines.push("Top products".to_string());
        for top in &stats.top_products {
            lines.push(format!("  {:<20} {}", top.product_name, top.activation_count));
        }
    }
    if !stats.weekly_activations.is_empty() {
        lines.push(String::new());
        lines.push("Last 7 days".to_string());
        for day in &stats.weekly_activations {
            lines.push(format!(
                "  {}  {}",
                day.date,
                "■".repeat(day.count.min(40) as usize)
            ));
        }
    }

    let paragraph = Paragraph::new(lines.join("\n"))
        .block(Block::default().borders(Borders::ALL).title(" Dashboard "))
        .wrap(Wrap { trim: false });
    f.render_widget(paragraph, area);
}

fn draw_footer(f: &mut Frame, app: &App, area: Rect) {
    let idle = if app.is_loading() { "Loading..." } else { "Ready" };
    let status = app.console.banner().unwrap_or(idle).to_string();
    let status = if app.console.session_expired() {
        Span::styled(status, Style::default().fg(Color::Red))
    } else {
        Span::raw(status)
    };
    let key = |k: &'static str| Span::styled(k, Style::default().fg(Color::Yellow));

    let help_text = vec![
        status,
        Span::raw(" | "),
        key("q"),
        Span::raw(":quit "),
        key("space"),
        Span::raw(":select "),
        key("a"),
        Span::raw(":all "),
        key("A"),
        Span::raw(":assign "),
        key("d"),
        Span::raw(":delete "),
        key("e"),
        Span::raw(":export "),
        key("/"),
        Span::raw(":search "),
        key("?"),
        Span::raw(":help"),
    ];

    let footer = Paragraph::new(Line::from(help_text)).block(Block::default().borders(Borders::ALL));
    f.render_widget(footer, area);
}

fn centered(area: Rect, width_pct: u16, height: u16) -> Rect {
    let vertical = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Min(0),
            Constraint::Length(height),
            Constraint::Min(0),
        ])
        .split(area);
    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - width_pct) / 2),
            Constraint::Percentage(width_pct),
            Constraint::Percentage((100 - width_pct) / 2),
        ])
        .split(vertical[1])[1]
}

fn draw_prompt(f: &mut Frame, app: &App, mode: InputMode) {
    let (title, body) = match mode {
        InputMode::Searching => (" Search ", format!("Serial, batch or product: {}_", app.input_buffer)),
        InputMode::AssigningShop => (
            " Assign to shop ",
            format!(
                "Shop ID for {} codes: {}_",
                app.console.selection().len(),
                app.input_buffer
            ),
        ),
        InputMode::GeneratingCodes => (" Generate codes ", format!("Quantity: {}_", app.input_buffer)),
        InputMode::ConfirmDeleteSelected => (
            " Delete codes ",
            format!("Delete {} selected codes? (y/n)", app.console.selection().len()),
        ),
        InputMode::ConfirmDeleteBatch => {
            let batch = match app.current_row() {
                Some(Row::Batch(id)) => id.to_string(),
                _ => String::new(),
            };
            (" Delete batch ", format!("Delete batch {batch} and all its codes? (y/n)"))
        }
        InputMode::Normal | InputMode::ShowingHelp => return,
    };

    let area = centered(f.area(), 60, 3);
    let prompt = Paragraph::new(body)
        .style(Style::default().fg(Color::Yellow))
        .block(Block::default().borders(Borders::ALL).title(title));
    f.render_widget(Clear, area);
    f.render_widget(prompt, area);
}

fn draw_help(f: &mut Frame) {
    let text = "\
Navigation
  j/k, up/down   move
  enter          expand or collapse batch
  r              reload batches
  i              toggle dashboard

Selection
  space          toggle code, or batch when expanded
  a              select or deselect all visible
  c              clear selection

Filters
  /              search
  s              cycle activation status
  o              cycle shop
  x              clear filters

Actions
  A              assign selected to shop
  d              delete selected
  e              export selected as PDF
  S              export selected as sticker sheet
  p              download batch PDF
  g              generate codes for batch product
  D              delete batch
  esc            stop waiting for a running action

  ?/esc          close help";

    let area = centered(f.area(), 60, 31);
    let help = Paragraph::new(text)
        .block(Block::default().borders(Borders::ALL).title(" Help "));
    f.render_widget(Clear, area);
    f.render_widget(help, area);
}
