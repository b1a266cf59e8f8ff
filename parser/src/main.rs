use parser::lexer::{Token, Tokenizer};

fn main() {
    let yaml = "key: value\n- item\n";
    let mut tokenizer = Tokenizer::new(yaml);
    loop {
        let token = tokenizer.next_token().expect("lexer error");
        println!("{:?}", token);
        if matches!(token, Token::Eof) {
            break;
        }
    }
}
