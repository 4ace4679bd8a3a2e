use web_sys::HtmlTextAreaElement;

/// Tallest the input box grows before it starts scrolling, in px.
pub const MAX_HEIGHT_PX: i32 = 240;

pub fn capped_height(scroll_height: i32) -> i32 {
    scroll_height.clamp(0, MAX_HEIGHT_PX)
}

/// Grows (or shrinks) `textarea` to fit its content, up to [`MAX_HEIGHT_PX`].
pub fn fit(textarea: &HtmlTextAreaElement) {
    let style = textarea.style();
    let _ = style.set_property("height", "auto");
    let height = capped_height(textarea.scroll_height());
    let _ = style.set_property("height", &format!("{height}px"));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn height_is_capped() {
        assert_eq!(capped_height(38), 38);
        assert_eq!(capped_height(900), MAX_HEIGHT_PX);
        assert_eq!(capped_height(-1), 0);
    }
}
