//! Browser and element automation actions

crate::code_action!("OpenBrowser", "Opens a new browser session");
crate::code_action!("CloseBrowser", "Closes the current browser session", aliases = ["Quit"]);
crate::code_action!("Click", "Clicks on the element located by the action locator");
crate::code_action!("SendKeys", "Types text into the element located by the action locator", aliases = ["Type"]);
crate::code_action!("GoToUrl", "Navigates the current window to a URL", aliases = ["Navigate"]);
crate::code_action!("Wait", "Pauses execution for the given number of milliseconds");
