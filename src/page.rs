use async_trait::async_trait;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use thirtyfour::components::SelectElement;
use thirtyfour::prelude::*;
use thirtyfour::Key;

#[derive(Debug, Error)]
pub enum PageError {
    #[error("webdriver: {0}")]
    Driver(#[from] thirtyfour::error::WebDriverError),

    #[error("page load timed out after {0:?}")]
    LoadTimeout(Duration),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl BoundingBox {
    pub fn center(&self) -> (f64, f64) {
        (self.x + self.width / 2.0, self.y + self.height / 2.0)
    }
}

/// The browser capability surface the engine depends on. Any automation
/// library exposing this shape substitutes; tests use an in-memory mock.
#[async_trait]
pub trait PageHandle: Send + Sync {
    async fn goto(&self, url: &str) -> Result<(), PageError>;
    async fn wait_for_load(&self, timeout: Duration) -> Result<(), PageError>;
    async fn locate(&self, selector: &str) -> Result<Vec<Box<dyn ElementHandle>>, PageError>;
    async fn mouse_move(&self, x: f64, y: f64) -> Result<(), PageError>;
    async fn mouse_click(&self) -> Result<(), PageError>;
    async fn current_url(&self) -> Result<String, PageError>;
    async fn body_text(&self) -> Result<String, PageError>;
    /// Descend into the nth iframe. Returns false if no such frame exists.
    async fn enter_frame(&self, index: usize) -> Result<bool, PageError>;
    async fn leave_frame(&self) -> Result<(), PageError>;
}

#[async_trait]
pub trait ElementHandle: Send + Sync {
    async fn is_visible(&self) -> Result<bool, PageError>;
    async fn click(&self) -> Result<(), PageError>;
    /// Clear the element and set its value in one shot.
    async fn fill(&self, value: &str) -> Result<(), PageError>;
    async fn input_value(&self) -> Result<String, PageError>;
    async fn bounding_box(&self) -> Result<Option<BoundingBox>, PageError>;
    async fn text(&self) -> Result<String, PageError>;
    async fn attr(&self, name: &str) -> Result<Option<String>, PageError>;
    async fn tag_name(&self) -> Result<String, PageError>;
    /// Append keystrokes without clearing. One call per character gives the
    /// humanizer control over cadence.
    async fn type_text(&self, text: &str) -> Result<(), PageError>;
    async fn press_backspace(&self) -> Result<(), PageError>;
    async fn is_checked(&self) -> Result<bool, PageError>;
    /// Pick an option on a native `<select>` by visible label.
    async fn select_label(&self, label: &str) -> Result<(), PageError>;
    async fn upload(&self, path: &Path) -> Result<(), PageError>;
    async fn query(&self, selector: &str) -> Result<Vec<Box<dyn ElementHandle>>, PageError>;
    async fn scroll_into_view(&self) -> Result<(), PageError>;
}

// --- thirtyfour adapter ---

pub struct WebDriverPage {
    driver: WebDriver,
}

impl WebDriverPage {
    /// Connect to a WebDriver endpoint (chromedriver) with launch arguments
    /// that suppress the most common automation fingerprints.
    pub async fn connect(server_url: &str) -> Result<Self, PageError> {
        let mut caps = DesiredCapabilities::chrome();
        caps.add_arg("--disable-blink-features=AutomationControlled")?;
        caps.add_arg("--window-size=1440,900")?;
        caps.add_arg("--lang=en-US")?;
        caps.add_arg(
            "--user-agent=Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) \
             AppleWebKit/537.36 (KHTML, like Gecko) Chrome/122.0.0.0 Safari/537.36",
        )?;

        let driver = WebDriver::new(server_url, caps).await?;
        Ok(Self { driver })
    }

    pub async fn quit(self) -> Result<(), PageError> {
        self.driver.quit().await?;
        Ok(())
    }

    async fn mask_webdriver_property(&self) -> Result<(), PageError> {
        // navigator.webdriver is the first thing naive bot checks look at.
        self.driver
            .execute(
                "Object.defineProperty(navigator, 'webdriver', {get: () => undefined})",
                vec![],
            )
            .await?;
        Ok(())
    }
}

#[async_trait]
impl PageHandle for WebDriverPage {
    async fn goto(&self, url: &str) -> Result<(), PageError> {
        self.driver.goto(url).await?;
        self.mask_webdriver_property().await?;
        Ok(())
    }

    async fn wait_for_load(&self, timeout: Duration) -> Result<(), PageError> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let ret = self
                .driver
                .execute("return document.readyState", vec![])
                .await?;
            if ret.json().as_str() == Some("complete") {
                return Ok(());
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(PageError::LoadTimeout(timeout));
            }
            tokio::time::sleep(Duration::from_millis(250)).await;
        }
    }

    async fn locate(&self, selector: &str) -> Result<Vec<Box<dyn ElementHandle>>, PageError> {
        let found = self.driver.find_all(By::Css(selector)).await?;
        Ok(found
            .into_iter()
            .map(|e| Box::new(WebDriverElement { inner: e }) as Box<dyn ElementHandle>)
            .collect())
    }

    async fn mouse_move(&self, x: f64, y: f64) -> Result<(), PageError> {
        self.driver
            .action_chain()
            .move_to(x as i64, y as i64)
            .perform()
            .await?;
        Ok(())
    }

    async fn mouse_click(&self) -> Result<(), PageError> {
        self.driver.action_chain().click().perform().await?;
        Ok(())
    }

    async fn current_url(&self) -> Result<String, PageError> {
        Ok(self.driver.current_url().await?.to_string())
    }

    async fn body_text(&self) -> Result<String, PageError> {
        let body = self.driver.find(By::Tag("body")).await?;
        Ok(body.text().await?)
    }

    async fn enter_frame(&self, index: usize) -> Result<bool, PageError> {
        let frames = self.driver.find_all(By::Tag("iframe")).await?;
        match frames.into_iter().nth(index) {
            Some(frame) => {
                frame.enter_frame().await?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn leave_frame(&self) -> Result<(), PageError> {
        self.driver.enter_default_frame().await?;
        Ok(())
    }
}

pub struct WebDriverElement {
    inner: WebElement,
}

#[async_trait]
impl ElementHandle for WebDriverElement {
    async fn is_visible(&self) -> Result<bool, PageError> {
        Ok(self.inner.is_displayed().await?)
    }

    async fn click(&self) -> Result<(), PageError> {
        self.inner.click().await?;
        Ok(())
    }

    async fn fill(&self, value: &str) -> Result<(), PageError> {
        self.inner.clear().await?;
        self.inner.send_keys(value).await?;
        Ok(())
    }

    async fn input_value(&self) -> Result<String, PageError> {
        match self.inner.prop("value").await? {
            Some(v) => Ok(v),
            None => Ok(self.inner.attr("value").await?.unwrap_or_default()),
        }
    }

    async fn bounding_box(&self) -> Result<Option<BoundingBox>, PageError> {
        let rect = self.inner.rect().await?;
        if rect.width <= 0.0 || rect.height <= 0.0 {
            return Ok(None);
        }
        Ok(Some(BoundingBox {
            x: rect.x,
            y: rect.y,
            width: rect.width,
            height: rect.height,
        }))
    }

    async fn text(&self) -> Result<String, PageError> {
        Ok(self.inner.text().await?)
    }

    async fn attr(&self, name: &str) -> Result<Option<String>, PageError> {
        Ok(self.inner.attr(name).await?)
    }

    async fn tag_name(&self) -> Result<String, PageError> {
        Ok(self.inner.tag_name().await?)
    }

    async fn type_text(&self, text: &str) -> Result<(), PageError> {
        self.inner.send_keys(text).await?;
        Ok(())
    }

    async fn press_backspace(&self) -> Result<(), PageError> {
        self.inner.send_keys(Key::Backspace).await?;
        Ok(())
    }

    async fn is_checked(&self) -> Result<bool, PageError> {
        Ok(self.inner.is_selected().await?)
    }

    async fn select_label(&self, label: &str) -> Result<(), PageError> {
        let select = SelectElement::new(&self.inner).await?;
        if select.select_by_exact_text(label).await.is_ok() {
            return Ok(());
        }
        select.select_by_partial_text(label).await?;
        Ok(())
    }

    async fn upload(&self, path: &Path) -> Result<(), PageError> {
        // File inputs accept the local path as keystrokes.
        self.inner
            .send_keys(path.to_string_lossy().to_string())
            .await?;
        Ok(())
    }

    async fn query(&self, selector: &str) -> Result<Vec<Box<dyn ElementHandle>>, PageError> {
        let found = self.inner.find_all(By::Css(selector)).await?;
        Ok(found
            .into_iter()
            .map(|e| Box::new(WebDriverElement { inner: e }) as Box<dyn ElementHandle>)
            .collect())
    }

    async fn scroll_into_view(&self) -> Result<(), PageError> {
        self.inner.scroll_into_view().await?;
        Ok(())
    }
}

// --- in-memory fake used across the crate's tests ---

#[cfg(test)]
pub(crate) mod mock {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct ElementState {
        value: Mutex<String>,
        checked: Mutex<bool>,
        clicks: AtomicUsize,
        fills: AtomicUsize,
        uploads: Mutex<Vec<String>>,
        selected: Mutex<Option<String>>,
    }

    /// Scripted DOM element. `matches` lists every selector the element
    /// answers to, sidestepping a real CSS engine.
    #[derive(Clone)]
    pub struct MockElement {
        pub matches: Vec<String>,
        pub tag: String,
        pub text: String,
        pub attrs: HashMap<String, String>,
        pub visible: bool,
        /// When set, reads of the value always return this instead of
        /// whatever was filled (a permanently misbehaving widget).
        pub sticky_value: Option<String>,
        pub box_: Option<BoundingBox>,
        pub children: Vec<MockElement>,
        state: Arc<ElementState>,
    }

    impl MockElement {
        pub fn new(tag: &str, matches: &[&str]) -> Self {
            Self {
                matches: matches.iter().map(|s| s.to_string()).collect(),
                tag: tag.to_string(),
                text: String::new(),
                attrs: HashMap::new(),
                visible: true,
                sticky_value: None,
                box_: Some(BoundingBox {
                    x: 100.0,
                    y: 100.0,
                    width: 200.0,
                    height: 30.0,
                }),
                children: Vec::new(),
                state: Arc::new(ElementState::default()),
            }
        }

        pub fn with_text(mut self, text: &str) -> Self {
            self.text = text.to_string();
            self
        }

        pub fn with_attr(mut self, name: &str, value: &str) -> Self {
            self.attrs.insert(name.to_string(), value.to_string());
            self
        }

        pub fn hidden(mut self) -> Self {
            self.visible = false;
            self
        }

        pub fn sticky(mut self, value: &str) -> Self {
            self.sticky_value = Some(value.to_string());
            self
        }

        pub fn with_child(mut self, child: MockElement) -> Self {
            self.children.push(child);
            self
        }

        pub fn click_count(&self) -> usize {
            self.state.clicks.load(Ordering::SeqCst)
        }

        pub fn fill_count(&self) -> usize {
            self.state.fills.load(Ordering::SeqCst)
        }

        pub fn current_value(&self) -> String {
            self.state.value.lock().unwrap().clone()
        }

        pub fn currently_checked(&self) -> bool {
            *self.state.checked.lock().unwrap()
        }

        pub fn uploaded(&self) -> Vec<String> {
            self.state.uploads.lock().unwrap().clone()
        }

        pub fn selected_label(&self) -> Option<String> {
            self.state.selected.lock().unwrap().clone()
        }

        fn matches_selector(&self, selector: &str) -> bool {
            self.matches.iter().any(|m| m == selector)
        }

        fn collect<'a>(&'a self, selector: &str, out: &mut Vec<&'a MockElement>) {
            if self.matches_selector(selector) {
                out.push(self);
            }
            for child in &self.children {
                child.collect(selector, out);
            }
        }
    }

    #[async_trait]
    impl ElementHandle for MockElement {
        async fn is_visible(&self) -> Result<bool, PageError> {
            Ok(self.visible)
        }

        async fn click(&self) -> Result<(), PageError> {
            self.state.clicks.fetch_add(1, Ordering::SeqCst);
            if self.tag == "input" && self.attrs.get("type").map(String::as_str) == Some("checkbox")
            {
                let mut checked = self.state.checked.lock().unwrap();
                *checked = !*checked;
            }
            Ok(())
        }

        async fn fill(&self, value: &str) -> Result<(), PageError> {
            self.state.fills.fetch_add(1, Ordering::SeqCst);
            *self.state.value.lock().unwrap() = value.to_string();
            Ok(())
        }

        async fn input_value(&self) -> Result<String, PageError> {
            if let Some(sticky) = &self.sticky_value {
                return Ok(sticky.clone());
            }
            Ok(self.current_value())
        }

        async fn bounding_box(&self) -> Result<Option<BoundingBox>, PageError> {
            Ok(self.box_)
        }

        async fn text(&self) -> Result<String, PageError> {
            Ok(self.text.clone())
        }

        async fn attr(&self, name: &str) -> Result<Option<String>, PageError> {
            Ok(self.attrs.get(name).cloned())
        }

        async fn tag_name(&self) -> Result<String, PageError> {
            Ok(self.tag.clone())
        }

        async fn type_text(&self, text: &str) -> Result<(), PageError> {
            self.state.value.lock().unwrap().push_str(text);
            Ok(())
        }

        async fn press_backspace(&self) -> Result<(), PageError> {
            self.state.value.lock().unwrap().pop();
            Ok(())
        }

        async fn is_checked(&self) -> Result<bool, PageError> {
            Ok(self.currently_checked())
        }

        async fn select_label(&self, label: &str) -> Result<(), PageError> {
            *self.state.selected.lock().unwrap() = Some(label.to_string());
            *self.state.value.lock().unwrap() = label.to_string();
            Ok(())
        }

        async fn upload(&self, path: &Path) -> Result<(), PageError> {
            self.state
                .uploads
                .lock()
                .unwrap()
                .push(path.to_string_lossy().to_string());
            Ok(())
        }

        async fn query(&self, selector: &str) -> Result<Vec<Box<dyn ElementHandle>>, PageError> {
            let mut out = Vec::new();
            for child in &self.children {
                child.collect(selector, &mut out);
            }
            Ok(out
                .into_iter()
                .map(|e| Box::new(e.clone()) as Box<dyn ElementHandle>)
                .collect())
        }

        async fn scroll_into_view(&self) -> Result<(), PageError> {
            Ok(())
        }
    }

    #[derive(Default)]
    pub struct MockPage {
        pub elements: Vec<MockElement>,
        pub body: String,
        url: Mutex<String>,
        moves: Mutex<Vec<(f64, f64)>>,
    }

    impl MockPage {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn with_elements(elements: Vec<MockElement>) -> Self {
            Self {
                elements,
                ..Self::default()
            }
        }

        pub fn with_body(mut self, body: &str) -> Self {
            self.body = body.to_string();
            self
        }

        pub fn pointer_moves(&self) -> Vec<(f64, f64)> {
            self.moves.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl PageHandle for MockPage {
        async fn goto(&self, url: &str) -> Result<(), PageError> {
            *self.url.lock().unwrap() = url.to_string();
            Ok(())
        }

        async fn wait_for_load(&self, _timeout: Duration) -> Result<(), PageError> {
            Ok(())
        }

        async fn locate(&self, selector: &str) -> Result<Vec<Box<dyn ElementHandle>>, PageError> {
            let mut out = Vec::new();
            for element in &self.elements {
                element.collect(selector, &mut out);
            }
            Ok(out
                .into_iter()
                .map(|e| Box::new(e.clone()) as Box<dyn ElementHandle>)
                .collect())
        }

        async fn mouse_move(&self, x: f64, y: f64) -> Result<(), PageError> {
            self.moves.lock().unwrap().push((x, y));
            Ok(())
        }

        async fn mouse_click(&self) -> Result<(), PageError> {
            Ok(())
        }

        async fn current_url(&self) -> Result<String, PageError> {
            Ok(self.url.lock().unwrap().clone())
        }

        async fn body_text(&self) -> Result<String, PageError> {
            Ok(self.body.clone())
        }

        async fn enter_frame(&self, _index: usize) -> Result<bool, PageError> {
            Ok(false)
        }

        async fn leave_frame(&self) -> Result<(), PageError> {
            Ok(())
        }
    }
}
