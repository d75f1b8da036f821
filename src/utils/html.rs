/// Clean author-supplied text using the ammonia library.
///
/// Quiz titles, question text and option text are rendered by participant
/// clients, so everything an administrator types goes through a whitelist
/// sanitizer before it is stored: harmless markup (like <b>, <code>) survives,
/// while <script>, <iframe> and event-handler attributes are stripped.
///
/// Note: `<script>` tags are removed together with their content.
pub fn clean_html(input: &str) -> String {
    ammonia::clean(input)
}
